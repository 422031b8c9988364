//! Tracing setup for binaries embedding the controller.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the embedding application's concern. `RUST_LOG` controls filtering,
//! defaulting to `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with console output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
