use anyhow::Result;
use tokio::signal;

use relink::config::Settings;
use relink::telemetry::init_tracing;
use relink::{Event, ManagedConnection, Payload};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!(url = %settings.connection.url, "Configuration loaded");

    // Create the managed connection; with auto_connect it dials immediately
    let connection = ManagedConnection::new(settings.connection);

    connection.on_open(|_| {
        tracing::info!("Connection open");
    });
    connection.on_message(|event| {
        if let Event::Message(raw) = event {
            tracing::info!(bytes = raw.len(), "Message received");
        }
    });
    connection.on_error(|event| {
        if let Event::Error(error) = event {
            tracing::warn!(error = %error, "Transport error");
        }
    });
    connection.on_close(|event| {
        if let Event::Close(frame) = event {
            tracing::info!(code = frame.as_ref().map(|f| f.code), "Connection closed");
        }
    });

    // Run until interrupted
    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    if let Some(Payload::Json(value)) = connection.last_message() {
        tracing::debug!(last = %value, "Last decoded payload");
    }

    connection.disconnect();
    connection.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
