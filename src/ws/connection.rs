//! WebSocket connection
//!
//! Thin tokio-tungstenite wrapper: connect with timeout, send text, receive
//! frames, close. No reconnection; the owner decides what a closed socket means.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};

/// Connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Errors that can occur with WebSocket connections
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// One realtime socket
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: ConnectionState,
}

impl WebSocketConnection {
    /// Connect to a `ws://` or `wss://` endpoint
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| WebSocketError::Timeout)?
            .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(tcp) = stream.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;
        }

        tracing::info!(target: "ws", "Connected to {}", url);

        Ok(Self {
            stream,
            state: ConnectionState::Connected,
        })
    }

    /// Send a text frame
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(WebSocketError::NotConnected);
        }
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| WebSocketError::SendFailed(e.to_string()))
    }

    /// Next frame; `None` once the peer has gone away
    ///
    /// A close frame is returned once and marks the connection disconnected.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if self.state != ConnectionState::Connected {
            return Err(WebSocketError::NotConnected);
        }

        match self.stream.next().await {
            Some(Ok(msg)) => {
                if msg.is_close() {
                    self.state = ConnectionState::Disconnected;
                }
                Ok(Some(msg))
            }
            Some(Err(e)) => {
                self.state = ConnectionState::Disconnected;
                Err(WebSocketError::ReceiveFailed(e.to_string()))
            }
            None => {
                self.state = ConnectionState::Disconnected;
                Ok(None)
            }
        }
    }

    #[inline(always)]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Start or finish the close handshake
    ///
    /// After a peer close this flushes the queued reply. Errors are ignored
    /// since the socket is being dropped.
    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
        self.state = ConnectionState::Disconnected;
    }
}
