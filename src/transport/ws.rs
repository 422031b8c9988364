//! WebSocket transport over tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ConnectionConfig;

use super::{CloseFrame, Connector, RawMessage, Transport, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that dials the configured endpoint over WebSocket.
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !config.protocols.is_empty() {
            let value = HeaderValue::from_str(&config.protocols.join(", "))
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(
            url = %config.url,
            status = %response.status(),
            "WebSocket handshake completed"
        );

        Ok(Box::new(WsTransport { stream }))
    }
}

/// A live WebSocket connection.
pub struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: RawMessage) -> Result<(), TransportError> {
        let frame = match message {
            RawMessage::Text(text) => Message::Text(text.into()),
            RawMessage::Binary(data) => Message::Binary(data.into()),
        };

        self.stream
            .send(frame)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), TransportError> {
        let ws_frame = frame.map(|f| WsCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.into(),
        });

        self.stream
            .close(ws_frame)
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(TransportEvent::Message(RawMessage::Text(text.to_string())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Some(TransportEvent::Message(RawMessage::Binary(data.to_vec())));
                }
                // Pings are answered by tungstenite itself; neither frame
                // carries application payload.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    return Some(TransportEvent::Closed(frame.map(|f| CloseFrame {
                        code: u16::from(f.code),
                        reason: f.reason.to_string(),
                    })));
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    return Some(TransportEvent::Error(TransportError::Protocol(
                        e.to_string(),
                    )));
                }
                None => return Some(TransportEvent::Closed(None)),
            }
        }
    }
}
