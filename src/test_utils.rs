//! Test fixtures: exchange rows, a gated order source and a scripted client

use crate::core::{Order, OrderSnapshot, Topic};
use crate::exchanges::traits::{FeedBatch, RealtimeClient};
use crate::rest::{ExchangeRequestError, OrderSource};
use crate::stream::Subscription;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub type FetchReply = oneshot::Sender<Result<OrderSnapshot, ExchangeRequestError>>;

/// Receive from a subscription, failing the test on timeout
pub async fn next<T: Clone>(sub: &mut Subscription<T>) -> Option<Result<T, ExchangeRequestError>> {
    tokio::time::timeout(RECV_TIMEOUT, sub.recv())
        .await
        .expect("timed out waiting for stream item")
}

/// Wait until `condition` holds, failing the test on timeout
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never became true");
}

pub fn quote_row(symbol: &str, bid: f64, ask: f64) -> Value {
    json!({
        "timestamp": "2020-01-01T00:00:00.000Z",
        "symbol": symbol,
        "bidSize": 100,
        "bidPrice": bid,
        "askPrice": ask,
        "askSize": 100
    })
}

pub fn position_row(symbol: &str, avg_entry_price: Option<f64>, current_qty: f64) -> Value {
    json!({
        "account": 1,
        "symbol": symbol,
        "currency": "XBt",
        "avgEntryPrice": avg_entry_price,
        "currentQty": current_qty
    })
}

pub fn order_row(order_id: &str, status: &str) -> Value {
    json!({
        "orderID": order_id,
        "symbol": "XBTUSD",
        "ordStatus": status,
        "side": "Buy",
        "orderQty": 100,
        "price": 9500.5
    })
}

pub fn snapshot_of(ids: &[&str]) -> OrderSnapshot {
    OrderSnapshot::new(
        ids.iter()
            .map(|id| Order::new(json!({ "orderID": id, "ordStatus": "New" })))
            .collect(),
    )
}

/// Order source whose fetches wait for the test to reply
///
/// Each `fetch_open_orders` call hands a reply sender to the receiver
/// returned by `new`, in call order.
pub struct GatedSource {
    requests: mpsc::UnboundedSender<FetchReply>,
}

impl GatedSource {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FetchReply>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { requests }), rx)
    }
}

impl OrderSource for GatedSource {
    async fn fetch_open_orders(&self) -> Result<OrderSnapshot, ExchangeRequestError> {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(tx).is_err() {
            return Err(ExchangeRequestError::new("test harness gone", None));
        }
        rx.await
            .unwrap_or_else(|_| Err(ExchangeRequestError::new("reply dropped", None)))
    }
}

/// Realtime client replaying batches pushed by the test
pub struct ScriptedClient {
    batches: mpsc::UnboundedReceiver<FeedBatch>,
    connected: bool,
}

impl ScriptedClient {
    pub fn new() -> (Self, mpsc::UnboundedSender<FeedBatch>) {
        let (tx, batches) = mpsc::unbounded_channel();
        (
            Self {
                batches,
                connected: false,
            },
            tx,
        )
    }
}

impl RealtimeClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&mut self) -> crate::Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, _symbol: &str, _topics: &[Topic]) -> crate::Result<()> {
        Ok(())
    }

    async fn next_batch(&mut self) -> crate::Result<Option<FeedBatch>> {
        let batch = self.batches.recv().await;
        if batch.is_none() {
            self.connected = false;
        }
        Ok(batch)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
