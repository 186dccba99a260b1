//! Order records
//!
//! Orders are kept opaque: the feed never interprets an order beyond its
//! `ordStatus`. Batches and snapshots share their records through `Arc` so
//! every subscriber of a stream sees the same allocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;

/// Terminal lifecycle states reported in `ordStatus`
const TERMINAL_STATUSES: [&str; 4] = ["Filled", "Canceled", "Rejected", "Expired"];

/// Single exchange order record
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Order(Value);

impl Order {
    #[inline]
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Raw JSON record
    #[inline]
    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn order_id(&self) -> Option<&str> {
        self.0.get("orderID").and_then(Value::as_str)
    }

    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(Value::as_str)
    }

    /// Lifecycle status, if the record carries one
    ///
    /// Update pushes often omit it.
    pub fn status(&self) -> Option<&str> {
        self.0.get("ordStatus").and_then(Value::as_str)
    }

    /// `Some(true)` while the order can still trade, `None` if unknown
    pub fn is_active(&self) -> Option<bool> {
        self.status().map(|s| !TERMINAL_STATUSES.contains(&s))
    }
}

/// Order records delivered by one push
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBatch(Arc<[Order]>);

impl OrderBatch {
    pub fn new(orders: Vec<Order>) -> Self {
        Self(orders.into())
    }

    /// Records with a known active status
    pub fn active(&self) -> impl Iterator<Item = &Order> {
        self.0.iter().filter(|o| o.is_active() == Some(true))
    }
}

impl Deref for OrderBatch {
    type Target = [Order];

    fn deref(&self) -> &[Order] {
        &self.0
    }
}

/// Open orders as returned by the order query endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot(Arc<[Order]>);

impl OrderSnapshot {
    pub fn new(orders: Vec<Order>) -> Self {
        Self(orders.into())
    }

    /// Parse a response body; the body must be a JSON array
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        let orders: Vec<Order> = serde_json::from_slice(body)?;
        Ok(Self::new(orders))
    }
}

impl Deref for OrderSnapshot {
    type Target = [Order];

    fn deref(&self) -> &[Order] {
        &self.0
    }
}
