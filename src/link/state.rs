//! Observable connection state.
//!
//! Everything readers can see is a snapshot: status and counters are
//! atomics, the latest message and error sit behind short-lived locks. Only
//! the driver task writes; handles and callbacks read.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::transport::{RawMessage, TransportError};

use super::Status;

/// Most recently received payload after structured decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Text that decoded as JSON
    Json(serde_json::Value),
    /// Text that failed structured decode, preserved unchanged
    Text(String),
    /// Binary payload, never decoded
    Binary(Vec<u8>),
}

impl Payload {
    /// Decode an inbound payload, falling back to the raw form when it is
    /// not valid JSON.
    pub(crate) fn decode(raw: &RawMessage) -> Self {
        match raw {
            RawMessage::Text(text) => match serde_json::from_str(text) {
                Ok(value) => Payload::Json(value),
                Err(_) => Payload::Text(text.clone()),
            },
            RawMessage::Binary(data) => Payload::Binary(data.clone()),
        }
    }
}

/// State shared between the controller handle and the driver task.
pub(crate) struct Shared {
    /// Current lifecycle phase (Status as u8)
    status: AtomicU8,
    /// Automatic reconnect attempts since the last successful open
    reconnect_count: AtomicU32,
    /// Set once on teardown; late events are ignored after this
    disposed: AtomicBool,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    last_message: RwLock<Option<Payload>>,
    last_error: RwLock<Option<TransportError>>,
    connected_at: RwLock<Option<DateTime<Utc>>>,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(Status::Closed as u8),
            reconnect_count: AtomicU32::new(0),
            disposed: AtomicBool::new(false),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            last_message: RwLock::new(None),
            last_error: RwLock::new(None),
            connected_at: RwLock::new(None),
        }
    }

    pub fn status(&self) -> Status {
        Status::from(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Acquire)
    }

    pub fn set_reconnect_count(&self, count: u32) {
        self.reconnect_count.store(count, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Transition to Open: counter reset, connection timestamp recorded.
    pub fn mark_open(&self) {
        self.set_status(Status::Open);
        self.set_reconnect_count(0);
        if let Ok(mut connected_at) = self.connected_at.write() {
            *connected_at = Some(Utc::now());
        }
    }

    pub fn record_received(&self, payload: Payload) {
        self.messages_received.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut last) = self.last_message.write() {
            *last = Some(payload);
        }
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_error(&self, error: TransportError) {
        if let Ok(mut last) = self.last_error.write() {
            *last = Some(error);
        }
    }

    pub fn clear_error(&self) {
        if let Ok(mut last) = self.last_error.write() {
            *last = None;
        }
    }

    pub fn last_message(&self) -> Option<Payload> {
        self.last_message.read().ok().and_then(|m| m.clone())
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.last_error.read().ok().and_then(|e| e.clone())
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            status: self.status(),
            reconnect_count: self.reconnect_count(),
            messages_sent: self.messages_sent.load(Ordering::Acquire),
            messages_received: self.messages_received.load(Ordering::Acquire),
            connected_at: self.connected_at.read().ok().and_then(|t| *t),
            last_error: self.last_error(),
        }
    }
}

/// Connection statistics
#[derive(Debug, Clone)]
pub struct LinkStats {
    pub status: Status,
    pub reconnect_count: u32,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Time of the most recent successful open
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<TransportError>,
}
