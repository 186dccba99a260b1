//! Upstream real-time client abstraction
//!
//! The feed only needs batches of raw records tagged with their topic. How a
//! client connects, authenticates or keeps its tables is its own business.

use crate::core::Topic;
use crate::Result;
use serde_json::Value;

/// Records delivered together for one topic
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBatch {
    pub topic: Topic,
    pub rows: Vec<Value>,
}

impl FeedBatch {
    pub fn new(topic: Topic, rows: Vec<Value>) -> Self {
        Self { topic, rows }
    }
}

/// Push-based market data client
///
/// # Design Notes
/// - Generic, not boxed: the adapter is monomorphized per client
/// - `next_batch()` returns `Ok(None)` once the upstream is closed
#[allow(async_fn_in_trait)]
pub trait RealtimeClient: Send {
    /// Client name (for logging)
    fn name(&self) -> &'static str;

    /// Open the connection
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe `topics` for `symbol`
    async fn subscribe(&mut self, symbol: &str, topics: &[Topic]) -> Result<()>;

    /// Receive next batch
    async fn next_batch(&mut self) -> Result<Option<FeedBatch>>;

    /// Check if connection is active
    fn is_connected(&self) -> bool;
}
