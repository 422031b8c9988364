//! Settable callback slots for lifecycle events.
//!
//! Slots are re-read on every event, so a handler registered after the
//! connection was established (or across a reconnect) still receives
//! subsequent events. Handlers registered at construction time are never
//! captured by the driver.

use std::sync::{Arc, RwLock};

use super::Event;

pub(crate) type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    on_open: RwLock<Option<EventHandler>>,
    on_close: RwLock<Option<EventHandler>>,
    on_error: RwLock<Option<EventHandler>>,
    on_message: RwLock<Option<EventHandler>>,
}

impl Callbacks {
    pub fn set_open(&self, handler: EventHandler) {
        if let Ok(mut slot) = self.on_open.write() {
            *slot = Some(handler);
        }
    }

    pub fn set_close(&self, handler: EventHandler) {
        if let Ok(mut slot) = self.on_close.write() {
            *slot = Some(handler);
        }
    }

    pub fn set_error(&self, handler: EventHandler) {
        if let Ok(mut slot) = self.on_error.write() {
            *slot = Some(handler);
        }
    }

    pub fn set_message(&self, handler: EventHandler) {
        if let Ok(mut slot) = self.on_message.write() {
            *slot = Some(handler);
        }
    }

    /// Invoke the handler registered for this event, if any. The slot is
    /// read at invocation time, not captured earlier.
    pub fn emit(&self, event: &Event) {
        let slot = match event {
            Event::Open => &self.on_open,
            Event::Close(_) => &self.on_close,
            Event::Error(_) => &self.on_error,
            Event::Message(_) => &self.on_message,
        };

        let handler = slot.read().ok().and_then(|s| s.clone());
        if let Some(handler) = handler {
            handler(event);
        }
    }
}
