// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod telemetry;

// Transport boundary
pub mod transport;

// Connection controller
pub mod link;

pub use config::ConnectionConfig;
pub use error::{LinkError, Result};
pub use link::{Event, LinkStats, ManagedConnection, Payload, Status};
pub use transport::{CloseFrame, Connector, RawMessage, Transport, TransportError, TransportEvent};
