//! BitMEX realtime WebSocket client
//!
//! Subscribes `quote:<symbol>`, `position` and `order:<symbol>` on
//! `/realtime`, optionally after `authKeyExpires`. Updates carry only changed
//! fields, so every table is kept locally and a keyed table (position, order)
//! is delivered as its full merged image after each frame. Append-only tables
//! (quote) are delivered as the rows just inserted, newest last.
//!
//! Keep-alive: a text `ping` is sent after `PING_INTERVAL` of silence; a
//! second silent interval without any reply is treated as a dead connection
//! and the socket is closed.

pub mod table;

use crate::core::Topic;
use crate::exchanges::traits::{FeedBatch, RealtimeClient};
use crate::rest::signing::{expires_from_now, RequestSigner};
use crate::ws::connection::{WebSocketConnection, WebSocketError};
use crate::{FeedError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use table::{Action, Table, MAX_TABLE_LEN};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Silence before a keep-alive ping
pub const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Realtime frame (only the fields we look at)
#[derive(Debug, Deserialize)]
struct Frame {
    table: Option<String>,
    action: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
    keys: Option<Vec<String>>,
    info: Option<String>,
    success: Option<bool>,
    subscribe: Option<String>,
    error: Option<String>,
    request: Option<Value>,
}

impl Frame {
    fn request_op(&self) -> Option<&str> {
        self.request.as_ref()?.get("op")?.as_str()
    }
}

fn ws_error(e: WebSocketError) -> FeedError {
    FeedError::WebSocket(e.to_string())
}

/// BitMEX realtime client
pub struct BitmexWsClient {
    url: String,
    connection: Option<WebSocketConnection>,
    signer: RequestSigner,
    /// Send `authKeyExpires` on connect
    authenticate: bool,
    authenticated: bool,
    tables: HashMap<Topic, Table>,
    max_table_len: usize,
    ping_interval: Duration,
    awaiting_pong: bool,
}

impl BitmexWsClient {
    /// BitMEX production realtime URL
    pub const WS_URL: &'static str = "wss://ws.bitmex.com/realtime";
    /// BitMEX testnet realtime URL
    pub const WS_URL_TESTNET: &'static str = "wss://ws.testnet.bitmex.com/realtime";

    pub fn new(url: impl Into<String>, signer: RequestSigner) -> Self {
        Self {
            url: url.into(),
            connection: None,
            signer,
            authenticate: true,
            authenticated: false,
            tables: HashMap::new(),
            max_table_len: MAX_TABLE_LEN,
            ping_interval: PING_INTERVAL,
            awaiting_pong: false,
        }
    }

    /// Whether to authenticate on connect (private topics need it)
    pub fn with_authentication(mut self, authenticate: bool) -> Self {
        self.authenticate = authenticate;
        self
    }

    /// Cap on rows kept per local table
    pub fn with_max_table_len(mut self, max_len: usize) -> Self {
        self.max_table_len = max_len;
        self
    }

    /// Silence before a keep-alive ping
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn connection(&mut self) -> Result<&mut WebSocketConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| FeedError::WebSocket("not connected".to_string()))
    }

    async fn send_op(&mut self, op: &str, args: Vec<Value>) -> Result<()> {
        let msg = serde_json::json!({ "op": op, "args": args });
        self.connection()?
            .send_text(&msg.to_string())
            .await
            .map_err(ws_error)
    }

    /// Topic arguments for one subscribe request
    fn topic_args(&self, symbol: &str, topics: &[Topic]) -> Vec<Value> {
        topics
            .iter()
            .filter(|topic| {
                let private = matches!(topic, Topic::Position | Topic::Order);
                if private && !self.authenticated {
                    tracing::warn!(
                        target: "ws",
                        "Skipping {} subscription: connection is not authenticated",
                        topic.name()
                    );
                    return false;
                }
                true
            })
            .map(|topic| match topic {
                // Account-wide; the adapter filters by symbol
                Topic::Position => Value::from("position"),
                Topic::Quote | Topic::Order => Value::from(format!("{}:{}", topic.name(), symbol)),
            })
            .collect()
    }

    /// Turn one text frame into a batch
    ///
    /// Control frames (welcome, subscribe and auth acks, errors) yield
    /// `Ok(None)`. A rejected `authKeyExpires` is an error.
    pub fn process_text(&mut self, text: &str) -> Result<Option<FeedBatch>> {
        if text == "pong" {
            return Ok(None);
        }

        let frame: Frame = serde_json::from_str(text).map_err(|e| FeedError::MalformedPayload {
            topic: "realtime",
            reason: e.to_string(),
        })?;

        if let Some(error) = &frame.error {
            if frame.request_op() == Some("authKeyExpires") {
                return Err(FeedError::WebSocket(format!("authentication rejected: {}", error)));
            }
            tracing::error!(target: "ws", "BitMEX error: {}", error);
            return Ok(None);
        }

        if let Some(info) = &frame.info {
            tracing::info!(target: "ws", "{}", info);
            return Ok(None);
        }

        if let Some(success) = frame.success {
            match (&frame.subscribe, frame.request_op()) {
                (Some(topic), _) => tracing::info!(target: "ws", "Subscribed {} ({})", topic, success),
                (None, Some("authKeyExpires")) => {
                    self.authenticated = success;
                    tracing::info!(target: "ws", "Authenticated: {}", success);
                }
                _ => tracing::debug!(target: "ws", "Ack: {}", text),
            }
            return Ok(None);
        }

        let (Some(table), Some(action)) = (frame.table.as_deref(), frame.action.as_deref()) else {
            tracing::debug!(target: "ws", "Unrecognized frame: {}", text);
            return Ok(None);
        };
        let Some(topic) = Topic::from_table(table) else {
            return Ok(None);
        };
        let Some(action) = Action::parse(action) else {
            tracing::warn!(target: "ws", "Unknown action {} on {}", action, table);
            return Ok(None);
        };

        let max_len = self.max_table_len;
        let table = self.tables.entry(topic).or_insert_with(|| Table::new(max_len));
        let appended = (action == Action::Insert && table.keys().is_empty()).then(|| frame.data.clone());
        let touched = table.apply(action, frame.keys, frame.data);
        // Every order frame is an event for the open orders refetch
        if touched == 0 && action != Action::Partial && topic != Topic::Order {
            return Ok(None);
        }
        let rows = appended.unwrap_or_else(|| table.rows().to_vec());
        Ok(Some(FeedBatch::new(topic, rows)))
    }
}

impl RealtimeClient for BitmexWsClient {
    fn name(&self) -> &'static str {
        "bitmex"
    }

    async fn connect(&mut self) -> Result<()> {
        let conn = WebSocketConnection::connect(&self.url).await.map_err(ws_error)?;
        self.connection = Some(conn);
        self.authenticated = false;
        self.awaiting_pong = false;
        self.tables.clear();

        if self.authenticate && self.signer.credentials().is_complete() {
            let (key, expires, signature) = self.signer.realtime_auth(expires_from_now());
            self.send_op(
                "authKeyExpires",
                vec![Value::from(key), Value::from(expires), Value::from(signature)],
            )
            .await?;
            // Acked asynchronously; private subscriptions are sent optimistically
            self.authenticated = true;
        } else if self.authenticate {
            tracing::warn!(target: "ws", "No API credentials; private topics unavailable");
        }

        Ok(())
    }

    async fn subscribe(&mut self, symbol: &str, topics: &[Topic]) -> Result<()> {
        let args = self.topic_args(symbol, topics);
        if args.is_empty() {
            return Ok(());
        }
        tracing::info!(target: "ws", "Subscribing {:?}", args);
        self.send_op("subscribe", args).await
    }

    async fn next_batch(&mut self) -> Result<Option<FeedBatch>> {
        loop {
            let awaiting_pong = self.awaiting_pong;
            let interval = self.ping_interval;
            let conn = self.connection()?;
            let msg = match timeout(interval, conn.recv()).await {
                Err(_) if awaiting_pong => {
                    tracing::warn!(target: "ws", "No reply to keep-alive ping, closing");
                    conn.close().await;
                    self.connection = None;
                    return Err(FeedError::WebSocket("keep-alive ping unanswered".to_string()));
                }
                Err(_) => {
                    conn.send_text("ping").await.map_err(ws_error)?;
                    self.awaiting_pong = true;
                    continue;
                }
                Ok(msg) => msg.map_err(ws_error)?,
            };

            self.awaiting_pong = false;

            match msg {
                Some(Message::Text(text)) => {
                    if let Some(batch) = self.process_text(text.as_str())? {
                        return Ok(Some(batch));
                    }
                }
                Some(Message::Close(frame)) => {
                    tracing::info!(target: "ws", "Closed by server: {:?}", frame);
                    if let Some(mut conn) = self.connection.take() {
                        conn.close().await;
                    }
                    return Ok(None);
                }
                None => {
                    self.connection = None;
                    return Ok(None);
                }
                Some(_) => {}
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_connected())
    }
}
