//! `WebSocket` connector built on `tokio-tungstenite`.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::connector::{Connection, Connector};
use crate::error::TransportError;

/// Connects to a `ws://` or `wss://` endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// Create a connector for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] if `url` does not parse
    /// or is not a `ws`/`wss` URL.
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme `{other}`, expected ws or wss"
            ))),
        }
    }

    /// The endpoint URL.
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for WsConnector {
    type Conn = WsConnection;

    async fn connect(&self) -> Result<WsConnection, TransportError> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {e}", self.url)))?;
        debug!(url = %self.url, status = %response.status(), "websocket handshake complete");
        Ok(WsConnection { stream })
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

/// An open `WebSocket` connection.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}

impl Connection for WsConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(None);
            };
            match message.map_err(|e| TransportError::Io(e.to_string()))? {
                WsMessage::Text(text) => return Ok(Some(text)),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => warn!(error = %e, "dropping non-UTF-8 binary frame"),
                },
                WsMessage::Close(frame) => {
                    debug!(?frame, "close frame received");
                    return Ok(None);
                }
                // tungstenite answers pings itself.
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "error while closing websocket");
        }
    }
}
