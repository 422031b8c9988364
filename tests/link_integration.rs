//! Connection controller integration tests
//!
//! These tests drive the controller through a scripted in-memory connector
//! so lifecycle, retry, and teardown behavior can be verified without a
//! network. Timer-dependent tests run on the paused tokio clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use relink::{
    CloseFrame, ConnectionConfig, Connector, Event, ManagedConnection, Payload, RawMessage,
    Status, Transport, TransportError, TransportEvent,
};

/// Handed to the test for each transport the connector establishes.
struct TransportControl {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<RawMessage>>>,
    close_requested: Arc<AtomicBool>,
}

impl TransportControl {
    fn inject(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn sent(&self) -> Vec<RawMessage> {
        self.sent.lock().unwrap().clone()
    }
}

/// Connector whose attempts succeed or fail according to a script; once the
/// script runs out, `default_ok` decides.
struct ScriptedConnector {
    script: Mutex<VecDeque<bool>>,
    default_ok: bool,
    attempts: AtomicUsize,
    transports: mpsc::UnboundedSender<TransportControl>,
}

impl ScriptedConnector {
    fn new(
        script: Vec<bool>,
        default_ok: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportControl>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into()),
            default_ok,
            attempts: AtomicUsize::new(0),
            transports: tx,
        });
        (connector, rx)
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let ok = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_ok);
        if !ok {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let close_requested = Arc::new(AtomicBool::new(false));

        let _ = self.transports.send(TransportControl {
            events: events_tx.clone(),
            sent: Arc::clone(&sent),
            close_requested: Arc::clone(&close_requested),
        });

        Ok(Box::new(ScriptedTransport {
            events: events_rx,
            loopback: events_tx,
            sent,
            close_requested,
        }))
    }
}

struct ScriptedTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    // Keeps the event channel open for the transport's own close event even
    // after the test drops its control handle.
    loopback: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<RawMessage>>>,
    close_requested: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: RawMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), TransportError> {
        self.close_requested.store(true, Ordering::SeqCst);
        // The peer completes the closing handshake
        let frame = frame.or_else(|| Some(CloseFrame::normal()));
        let _ = self.loopback.send(TransportEvent::Closed(frame));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

fn test_config(auto_connect: bool, attempts: u32, interval_ms: u64) -> ConnectionConfig {
    let mut config = ConnectionConfig::new("ws://localhost:9000/test");
    config.auto_connect = auto_connect;
    config.reconnect_attempts = attempts;
    config.reconnect_interval_ms = interval_ms;
    config
}

async fn wait_for_status(connection: &ManagedConnection, status: Status) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while connection.status() != status {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "timed out waiting for status {}, got {}",
            status,
            connection.status()
        )
    });
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Connect, wait for Open, and return the transport control.
async fn open_connection(
    connection: &ManagedConnection,
    transports: &mut mpsc::UnboundedReceiver<TransportControl>,
) -> TransportControl {
    wait_for_status(connection, Status::Open).await;
    transports.recv().await.expect("no transport established")
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_opens() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(false, 5, 3000), connector.clone());

    assert_eq!(connection.status(), Status::Closed);
    assert!(!connection.is_connected());

    connection.connect();
    open_connection(&connection, &mut transports).await;

    assert!(connection.is_connected());
    assert_eq!(connection.reconnect_count(), 0);
    assert!(connection.stats().connected_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_open_is_noop() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(false, 5, 3000), connector.clone());

    connection.connect();
    open_connection(&connection, &mut transports).await;

    // Further connects must not create a second transport
    connection.connect();
    connection.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(connector.attempts(), 1);
    assert!(transports.try_recv().is_err());
    assert_eq!(connection.status(), Status::Open);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_budget_is_bounded() {
    // Endpoint that never comes up: initial attempt plus two retries, then
    // the controller stays closed.
    let (connector, _transports) = ScriptedConnector::new(vec![], false);
    let connection =
        ManagedConnection::with_connector(test_config(true, 2, 100), connector.clone());

    wait_until(|| connector.attempts() == 3).await;

    // Well past the reconnect interval: no further attempts
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts(), 3);
    assert_eq!(connection.status(), Status::Closed);
    assert_eq!(connection.reconnect_count(), 2);
    assert!(connection.last_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_suppresses_reconnect() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 100), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    connection.disconnect();
    wait_for_status(&connection, Status::Closed).await;
    assert!(control.close_requested.load(Ordering::SeqCst));

    // Budget is forced to the maximum and no timer is pending
    assert_eq!(connection.reconnect_count(), 5);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connection.status(), Status::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting_aborts() {
    let (connector, _transports) = ScriptedConnector::new(vec![], false);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 100), connector.clone());

    wait_until(|| connector.attempts() >= 1).await;
    connection.disconnect();

    wait_for_status(&connection, Status::Closed).await;
    let attempts = connector.attempts();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts(), attempts);
}

#[tokio::test(start_paused = true)]
async fn test_counter_resets_on_open() {
    // First attempt fails, the retry succeeds
    let (connector, mut transports) = ScriptedConnector::new(vec![false], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 100), connector.clone());

    let control = open_connection(&connection, &mut transports).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(connection.reconnect_count(), 0);

    // An unexpected close starts counting from zero again
    control.inject(TransportEvent::Closed(Some(CloseFrame::new(1006, "lost"))));
    open_connection(&connection, &mut transports).await;
    assert_eq!(connector.attempts(), 3);
    assert_eq!(connection.reconnect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_resets_exhausted_budget() {
    let (connector, mut transports) = ScriptedConnector::new(vec![false, false], false);
    let connection =
        ManagedConnection::with_connector(test_config(true, 1, 100), connector.clone());

    // Initial attempt plus the single retry, both failing
    wait_until(|| connector.attempts() == 2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(connection.status(), Status::Closed);
    assert_eq!(connection.reconnect_count(), 1);

    // A manual connect resets the budget; this attempt succeeds
    {
        let mut script = connector.script.lock().unwrap();
        script.push_back(true);
    }
    connection.connect();
    open_connection(&connection, &mut transports).await;
    assert_eq!(connection.reconnect_count(), 0);
    assert!(connection.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_json_message_is_decoded() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    control.inject(TransportEvent::Message(RawMessage::Text(
        r#"{"type":"ping"}"#.to_string(),
    )));
    wait_until(|| connection.last_message().is_some()).await;

    assert_eq!(
        connection.last_message(),
        Some(Payload::Json(json!({"type": "ping"})))
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_json_message_kept_raw() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    control.inject(TransportEvent::Message(RawMessage::Text(
        "not json".to_string(),
    )));
    wait_until(|| connection.last_message().is_some()).await;
    assert_eq!(
        connection.last_message(),
        Some(Payload::Text("not json".to_string()))
    );

    control.inject(TransportEvent::Message(RawMessage::Binary(vec![1, 2, 3])));
    wait_until(|| connection.last_message() == Some(Payload::Binary(vec![1, 2, 3]))).await;

    assert_eq!(connection.stats().messages_received, 2);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_closed_is_dropped() {
    let (connector, _transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(false, 5, 3000), connector.clone());

    connection.send("hello");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // No transport was ever created, nothing was sent
    assert_eq!(connector.attempts(), 0);
    assert_eq!(connection.stats().messages_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_forwards_payload_unchanged() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    connection.send("raw text");
    connection.send(vec![0xffu8, 0x00]);
    wait_until(|| control.sent().len() == 2).await;

    assert_eq!(
        control.sent(),
        vec![
            RawMessage::Text("raw text".to_string()),
            RawMessage::Binary(vec![0xff, 0x00]),
        ]
    );
    assert_eq!(connection.stats().messages_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn test_send_json_encodes_and_propagates_errors() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    assert_ok!(connection.send_json(&json!({"type": "hello", "seq": 1})));
    wait_until(|| control.sent().len() == 1).await;
    assert_eq!(
        control.sent(),
        vec![RawMessage::Text(r#"{"type":"hello","seq":1}"#.to_string())]
    );

    // Maps with non-string keys cannot be encoded as JSON; the failure
    // reaches the caller instead of being dropped
    let unencodable = std::collections::HashMap::from([((1u8, 2u8), "value")]);
    assert_err!(connection.send_json(&unencodable));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_leaves_status_open() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    control.inject(TransportEvent::Error(TransportError::Protocol(
        "bad frame".to_string(),
    )));
    wait_until(|| connection.last_error().is_some()).await;

    // The error alone does not drive a transition
    assert_eq!(connection.status(), Status::Open);

    // The close that follows does
    control.inject(TransportEvent::Closed(None));
    wait_for_status(&connection, Status::Closed).await;
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_fire_in_arrival_order() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(false, 0, 3000), connector.clone());

    let log = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str| {
        let log = Arc::clone(&log);
        move |_: &Event| log.lock().unwrap().push(name)
    };
    connection.on_open(record("open"));
    connection.on_close(record("close"));
    connection.on_error(record("error"));
    connection.on_message(record("message"));

    connection.connect();
    let control = open_connection(&connection, &mut transports).await;

    control.inject(TransportEvent::Message(RawMessage::Text("a".to_string())));
    control.inject(TransportEvent::Error(TransportError::Protocol(
        "oops".to_string(),
    )));
    control.inject(TransportEvent::Closed(None));
    wait_for_status(&connection, Status::Closed).await;

    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["open", "message", "error", "close"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_silences_late_events() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    let messages_seen = Arc::new(AtomicUsize::new(0));
    let messages_seen_clone = Arc::clone(&messages_seen);
    connection.on_message(move |_| {
        messages_seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    let stats_before = connection.stats();
    connection.shutdown().await;

    // The transport delivers events after the controller is gone
    control.inject(TransportEvent::Message(RawMessage::Text("late".to_string())));
    control.inject(TransportEvent::Closed(None));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(messages_seen.load(Ordering::SeqCst), 0);
    assert_eq!(stats_before.messages_received, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drop_closes_transport() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 3000), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    drop(connection);
    wait_until(|| control.close_requested.load(Ordering::SeqCst)).await;
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_close_schedules_single_retry_timer() {
    let (connector, mut transports) = ScriptedConnector::new(vec![], true);
    let connection =
        ManagedConnection::with_connector(test_config(true, 5, 200), connector.clone());

    let control = open_connection(&connection, &mut transports).await;

    control.inject(TransportEvent::Closed(Some(CloseFrame::new(1006, ""))));
    wait_for_status(&connection, Status::Closed).await;
    assert_eq!(connection.reconnect_count(), 1);

    // Exactly one reconnect fires after the fixed interval
    open_connection(&connection, &mut transports).await;
    assert_eq!(connector.attempts(), 2);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts(), 2);
}
