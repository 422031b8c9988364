//! Managed duplex connection controller.
//!
//! The controller owns exactly one underlying transport at a time. A single
//! driver task holds the transport, the pending reconnect timer, and the
//! lifecycle state machine; handle operations (`connect`, `disconnect`,
//! `send`) post commands to the driver and return immediately. After an
//! unexpected closure the driver re-establishes the connection with a fixed
//! delay, up to a bounded number of attempts.

use std::fmt;

use crate::transport::{CloseFrame, RawMessage, TransportError};

mod callbacks;
mod controller;
mod driver;
mod retry;
mod state;

pub use controller::ManagedConnection;
pub use retry::RetryPolicy;
pub use state::{LinkStats, Payload};

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// A connect attempt is in flight
    Connecting = 0,
    /// The transport is established and usable
    Open = 1,
    /// Local closure was requested, awaiting the transport's close event
    Closing = 2,
    /// No live transport
    Closed = 3,
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            0 => Status::Connecting,
            1 => Status::Open,
            2 => Status::Closing,
            _ => Status::Closed,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Connecting => "connecting",
            Status::Open => "open",
            Status::Closing => "closing",
            Status::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle event delivered to registered callbacks.
///
/// Events are emitted in transport arrival order, one at a time, with no
/// batching or reordering.
#[derive(Debug, Clone)]
pub enum Event {
    /// The transport was established
    Open,
    /// Inbound payload, framing untouched
    Message(RawMessage),
    /// Transport-level error; status is unchanged by this event alone
    Error(TransportError),
    /// The transport is gone, with the peer's close frame if one was sent
    Close(Option<CloseFrame>),
}
