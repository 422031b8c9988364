//! Public handle for a managed connection.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::transport::{CloseFrame, Connector, RawMessage, TransportError, WsConnector};

use super::callbacks::Callbacks;
use super::driver::{Command, Driver};
use super::state::{LinkStats, Payload, Shared};
use super::{Event, Status};

/// Handle to one managed duplex connection.
///
/// Construction spawns the driver task; with `auto_connect` set (the
/// default) the first connect attempt starts immediately. All operations
/// return without blocking and their effects are observed through the
/// status, the snapshot getters, and registered callbacks.
///
/// Dropping the handle tears the connection down: the pending reconnect
/// timer is cancelled, the live transport is closed, and late transport
/// events are discarded.
pub struct ManagedConnection {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    callbacks: Arc<Callbacks>,
    driver: Option<JoinHandle<()>>,
}

impl ManagedConnection {
    /// Connect to the configured endpoint over WebSocket.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Connect through a caller-supplied transport factory. This is the
    /// seam tests drive scripted transports through.
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let shared = Arc::new(Shared::new());
        let callbacks = Arc::new(Callbacks::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = Driver::new(
            config,
            connector,
            Arc::clone(&shared),
            Arc::clone(&callbacks),
            rx,
        );
        let handle = tokio::spawn(driver.run());

        Self {
            commands: tx,
            shared,
            callbacks,
            driver: Some(handle),
        }
    }

    /// Establish the connection. A no-op while a transport is already live
    /// or a connect attempt is in flight; otherwise cancels any pending
    /// reconnect timer and resets the retry budget.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Close the connection and suppress all further automatic reconnects.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect { frame: None });
    }

    /// `disconnect` with an explicit close code and reason.
    pub fn disconnect_with(&self, code: u16, reason: impl Into<String>) {
        let _ = self.commands.send(Command::Disconnect {
            frame: Some(CloseFrame::new(code, reason)),
        });
    }

    /// Forward a payload to the peer unchanged. Silently dropped unless the
    /// connection is open.
    pub fn send(&self, message: impl Into<RawMessage>) {
        if self.shared.status() != Status::Open {
            tracing::debug!(status = %self.shared.status(), "Dropping send, connection not open");
            return;
        }
        let _ = self.commands.send(Command::Send(message.into()));
    }

    /// Serialize `value` as JSON and send it. Unlike network conditions,
    /// an encode failure is a caller error and is returned synchronously.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.send(text);
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Derived: `status() == Status::Open`.
    pub fn is_connected(&self) -> bool {
        self.shared.status() == Status::Open
    }

    /// Most recently received payload after structured decode, if any.
    pub fn last_message(&self) -> Option<Payload> {
        self.shared.last_message()
    }

    /// Most recent transport error, cleared when a new connect attempt
    /// starts.
    pub fn last_error(&self) -> Option<TransportError> {
        self.shared.last_error()
    }

    /// Automatic reconnect attempts since the last successful open.
    pub fn reconnect_count(&self) -> u32 {
        self.shared.reconnect_count()
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> LinkStats {
        self.shared.stats()
    }

    /// Register the open handler. Replaces any previous one; the latest
    /// registration is the one invoked for every future event.
    pub fn on_open(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.callbacks.set_open(Arc::new(handler));
    }

    pub fn on_close(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.callbacks.set_close(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.callbacks.set_error(Arc::new(handler));
    }

    pub fn on_message(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.callbacks.set_message(Arc::new(handler));
    }

    /// Tear down the controller and wait for the driver to finish closing
    /// the transport.
    pub async fn shutdown(mut self) {
        self.shared.dispose();
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.driver.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        // Best effort when dropped without an explicit shutdown; closing
        // the command channel makes the driver tear itself down.
        self.shared.dispose();
        let _ = self.commands.send(Command::Shutdown);
    }
}
