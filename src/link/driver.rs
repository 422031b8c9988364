//! The driver task behind a managed connection.
//!
//! One task owns the transport, the in-flight connect attempt, and the
//! single pending reconnect timer. Commands and transport events are
//! processed one at a time, so state transitions and callback invocations
//! follow arrival order with no interleaving.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Sleep;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::transport::{CloseFrame, Connector, RawMessage, Transport, TransportError, TransportEvent};

use super::callbacks::Callbacks;
use super::retry::RetryPolicy;
use super::state::{Payload, Shared};
use super::{Event, Status};

/// Commands posted from the controller handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect { frame: Option<CloseFrame> },
    Send(RawMessage),
    Shutdown,
}

type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, TransportError>> + Send>>;

/// What woke the driver loop up.
enum Wake {
    Command(Option<Command>),
    Connected(Result<Box<dyn Transport>, TransportError>),
    Transport(Option<TransportEvent>),
    ReconnectDue,
}

pub(crate) struct Driver {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    callbacks: Arc<Callbacks>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Live transport; non-null only between a successful connect and the
    /// corresponding close event.
    transport: Option<Box<dyn Transport>>,
    /// At most one connect attempt is in flight at a time.
    connect_in_flight: Option<ConnectFuture>,
    /// At most one pending reconnect timer exists at a time.
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    retry: RetryPolicy,
    /// Set by an explicit disconnect; suppresses auto-reconnect on the
    /// close event that follows.
    user_close: bool,
    /// Identifies the current connect attempt in log output.
    attempt_id: Uuid,
}

impl Driver {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<Shared>,
        callbacks: Arc<Callbacks>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let retry = RetryPolicy::new(config.reconnect_attempts, config.reconnect_interval());
        Self {
            config,
            connector,
            shared,
            callbacks,
            commands,
            transport: None,
            connect_in_flight: None,
            reconnect_timer: None,
            retry,
            user_close: false,
            attempt_id: Uuid::new_v4(),
        }
    }

    pub async fn run(mut self) {
        if self.config.auto_connect {
            self.begin_connect();
        }

        loop {
            let wake = {
                let has_connect = self.connect_in_flight.is_some();
                let has_transport = self.transport.is_some();
                let has_timer = self.reconnect_timer.is_some();

                let commands = &mut self.commands;
                let connect = &mut self.connect_in_flight;
                let transport = &mut self.transport;
                let timer = &mut self.reconnect_timer;

                tokio::select! {
                    cmd = commands.recv() => Wake::Command(cmd),
                    result = poll_connect(connect), if has_connect => Wake::Connected(result),
                    event = poll_transport(transport), if has_transport => Wake::Transport(event),
                    _ = poll_timer(timer), if has_timer => Wake::ReconnectDue,
                }
            };

            match wake {
                // Handle dropped without an explicit shutdown
                Wake::Command(None) => {
                    self.teardown().await;
                    break;
                }
                Wake::Command(Some(command)) => {
                    if !self.handle_command(command).await {
                        self.teardown().await;
                        break;
                    }
                }
                Wake::Connected(result) => self.on_connect_result(result),
                Wake::Transport(event) => self.on_transport_event(event),
                Wake::ReconnectDue => {
                    self.reconnect_timer = None;
                    tracing::info!(
                        attempt = self.retry.attempt(),
                        max_attempts = self.config.reconnect_attempts,
                        "Reconnect timer fired"
                    );
                    self.begin_connect();
                }
            }
        }
    }

    /// Returns false when the driver should tear down and exit.
    async fn handle_command(&mut self, command: Command) -> bool {
        // The handle marks the controller disposed before posting Shutdown;
        // commands that were already queued behind it are ignored.
        if self.shared.is_disposed() {
            return !matches!(command, Command::Shutdown);
        }

        match command {
            Command::Connect => {
                self.manual_connect();
                true
            }
            Command::Disconnect { frame } => {
                self.disconnect(frame).await;
                true
            }
            Command::Send(message) => {
                self.send(message).await;
                true
            }
            Command::Shutdown => false,
        }
    }

    /// Explicit connect request. A no-op while a transport is live or an
    /// attempt is already in flight, preventing duplicate transports.
    fn manual_connect(&mut self) {
        if self.transport.is_some() || self.connect_in_flight.is_some() {
            tracing::debug!(status = %self.shared.status(), "Ignoring connect, already active");
            return;
        }

        self.reconnect_timer = None;
        self.user_close = false;
        self.retry.reset();
        self.shared.set_reconnect_count(0);
        self.begin_connect();
    }

    /// Start a connect attempt: clear the last error, move to Connecting,
    /// and hand the connector a fresh attempt.
    fn begin_connect(&mut self) {
        debug_assert!(self.transport.is_none());
        debug_assert!(self.connect_in_flight.is_none());

        self.reconnect_timer = None;
        self.attempt_id = Uuid::new_v4();
        self.shared.clear_error();
        self.shared.set_status(Status::Connecting);

        let connector = Arc::clone(&self.connector);
        let config = self.config.clone();
        self.connect_in_flight = Some(Box::pin(async move { connector.connect(&config).await }));

        tracing::info!(
            attempt_id = %self.attempt_id,
            url = %self.config.url,
            "Connecting"
        );
    }

    fn on_connect_result(&mut self, result: Result<Box<dyn Transport>, TransportError>) {
        self.connect_in_flight = None;

        if self.shared.is_disposed() {
            return;
        }

        match result {
            Ok(transport) => {
                self.transport = Some(transport);
                self.retry.reset();
                self.shared.mark_open();
                tracing::info!(attempt_id = %self.attempt_id, "Connection open");
                self.callbacks.emit(&Event::Open);
            }
            Err(error) => {
                // Construction failure counts as an immediate close and
                // goes through the same reconnect policy.
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    error = %error,
                    "Connect attempt failed"
                );
                self.shared.set_error(error.clone());
                self.callbacks.emit(&Event::Error(error));
                self.finish_close(None);
            }
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        if self.shared.is_disposed() {
            return;
        }

        // A transport whose event stream ends without a close frame is gone
        // all the same.
        let event = event.unwrap_or(TransportEvent::Closed(None));

        match event {
            TransportEvent::Message(raw) => {
                self.shared.record_received(Payload::decode(&raw));
                self.callbacks.emit(&Event::Message(raw));
            }
            TransportEvent::Error(error) => {
                // Status is unchanged: a subsequent close event, if any,
                // drives the transition.
                tracing::warn!(attempt_id = %self.attempt_id, error = %error, "Transport error");
                self.shared.set_error(error.clone());
                self.callbacks.emit(&Event::Error(error));
            }
            TransportEvent::Closed(frame) => {
                tracing::info!(
                    attempt_id = %self.attempt_id,
                    code = frame.as_ref().map(|f| f.code),
                    "Transport closed"
                );
                self.finish_close(frame);
            }
        }
    }

    /// Complete the transition to Closed and decide on a reconnect.
    fn finish_close(&mut self, frame: Option<CloseFrame>) {
        self.transport = None;
        self.shared.set_status(Status::Closed);
        self.callbacks.emit(&Event::Close(frame));
        self.maybe_schedule_reconnect();
    }

    fn maybe_schedule_reconnect(&mut self) {
        if self.user_close || !self.config.auto_reconnect {
            return;
        }

        match self.retry.next_delay() {
            Some(delay) => {
                self.shared.set_reconnect_count(self.retry.attempt());
                // Replaces any pending timer; never stacks a second one
                self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
                tracing::info!(
                    attempt = self.retry.attempt(),
                    max_attempts = self.config.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduled reconnect"
                );
            }
            None => {
                tracing::warn!(
                    attempts = self.retry.attempt(),
                    "Reconnect budget exhausted, staying closed"
                );
            }
        }
    }

    /// Explicit disconnect: cancels any pending reconnect, spends the whole
    /// retry budget, and requests transport closure. The only way to stop
    /// the retry cycle short of a successful open.
    async fn disconnect(&mut self, frame: Option<CloseFrame>) {
        self.reconnect_timer = None;
        self.user_close = true;
        self.retry.exhaust();
        self.shared.set_reconnect_count(self.retry.attempt());

        // Abort an attempt that has not produced a transport yet
        if self.connect_in_flight.is_some() {
            self.connect_in_flight = None;
            self.shared.set_status(Status::Closed);
            tracing::info!(attempt_id = %self.attempt_id, "Connect attempt aborted");
            return;
        }

        let close_error = match self.transport.as_mut() {
            Some(transport) => {
                self.shared.set_status(Status::Closing);
                tracing::info!(attempt_id = %self.attempt_id, "Closing connection");
                transport.close(frame).await.err()
            }
            None => {
                self.shared.set_status(Status::Closed);
                None
            }
        };

        // On success the transport's own Closed event completes the
        // transition without scheduling a reconnect. A failed close request
        // means the transport is already dead.
        if let Some(error) = close_error {
            tracing::warn!(error = %error, "Close request failed");
            self.shared.set_error(error);
            self.finish_close(None);
        }
    }

    /// Forward a payload to the transport. Silently dropped unless Open.
    async fn send(&mut self, message: RawMessage) {
        if self.shared.status() != Status::Open {
            tracing::debug!(
                status = %self.shared.status(),
                bytes = message.len(),
                "Dropping outbound message, connection not open"
            );
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        match transport.send(message).await {
            Ok(()) => self.shared.record_sent(),
            Err(error) => {
                tracing::warn!(attempt_id = %self.attempt_id, error = %error, "Send failed");
                self.shared.set_error(error.clone());
                self.callbacks.emit(&Event::Error(error));
            }
        }
    }

    /// Final teardown: mark disposed so late events mutate nothing, drop
    /// the timer and any in-flight attempt, close the live transport.
    async fn teardown(&mut self) {
        self.shared.dispose();
        self.reconnect_timer = None;
        self.connect_in_flight = None;

        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close(Some(CloseFrame::normal())).await;
        }

        self.shared.set_status(Status::Closed);
        tracing::debug!("Connection controller torn down");
    }
}

async fn poll_connect(fut: &mut Option<ConnectFuture>) -> Result<Box<dyn Transport>, TransportError> {
    match fut.as_mut() {
        Some(f) => f.as_mut().await,
        None => future::pending().await,
    }
}

async fn poll_transport(transport: &mut Option<Box<dyn Transport>>) -> Option<TransportEvent> {
    match transport.as_mut() {
        Some(t) => t.next_event().await,
        None => future::pending().await,
    }
}

async fn poll_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
