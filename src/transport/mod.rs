//! Transport boundary for the connection controller.
//!
//! The controller never touches a concrete socket type directly: it drives
//! a `Transport` obtained from a `Connector`, and every raw event the
//! transport produces is translated into a `TransportEvent` at this
//! boundary. A successful `Connector::connect` is the "opened" event; a
//! failed one is treated as an immediate close.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConnectionConfig;

pub mod ws;

pub use ws::WsConnector;

/// Transport-level error.
///
/// Cloneable because the most recent error is retained as an observable
/// snapshot alongside the connection status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to establish transport: {0}")]
    Connect(String),

    #[error("Failed to send on transport: {0}")]
    Send(String),

    #[error("Failed to close transport: {0}")]
    Close(String),

    #[error("Transport protocol error: {0}")]
    Protocol(String),
}

/// A raw payload as carried by the transport, framing untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl RawMessage {
    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for RawMessage {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RawMessage {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RawMessage {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

/// Close details reported by the peer, mapped to a neutral shape so no
/// transport-specific frame type leaks into the controller contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure (code 1000) with no reason.
    pub fn normal() -> Self {
        Self::new(1000, "")
    }
}

/// Event produced by a live transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Inbound payload.
    Message(RawMessage),
    /// Runtime error. Does not itself end the connection; a subsequent
    /// `Closed` event, if any, does.
    Error(TransportError),
    /// The transport is gone, whether by peer close, network failure, or
    /// local request.
    Closed(Option<CloseFrame>),
}

/// A live duplex transport, exclusively owned by the controller driver.
#[async_trait]
pub trait Transport: Send {
    /// Forward a payload to the peer unchanged.
    async fn send(&mut self, message: RawMessage) -> Result<(), TransportError>;

    /// Request transport closure. The closing handshake completes
    /// asynchronously; a `Closed` event follows from `next_event`.
    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), TransportError>;

    /// Next event from the transport. `None` means the event stream ended
    /// without a close frame and is treated as `Closed(None)` by callers.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

/// Factory for transports. The production implementation is
/// [`WsConnector`]; tests substitute scripted connectors through this seam.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig)
        -> Result<Box<dyn Transport>, TransportError>;
}
