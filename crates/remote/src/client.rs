//! WebSocket connector for the progress endpoint.
//!
//! [`ChannelClient`] holds the endpoint URL. Call
//! [`ChannelClient::connect`] to open a raw [`WsStream`]; the
//! reconnecting [`Channel`](crate::channel::Channel) drives it.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// A live WebSocket stream to the progress endpoint.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for the progress endpoint.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    url: String,
}

impl ChannelClient {
    /// * `url` - WebSocket URL, e.g. `ws://host:8000/ws/progress`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a WebSocket connection to the endpoint.
    pub async fn connect(&self) -> Result<WsStream, ChannelError> {
        let (ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            ChannelError::Connection(format!("Failed to connect to {}: {e}", self.url))
        })?;

        tracing::debug!(url = %self.url, "WebSocket handshake complete");
        Ok(ws_stream)
    }
}

/// Errors raised by the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
