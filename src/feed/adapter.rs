//! Raw feed adapter
//!
//! Bridges the upstream client into one broadcast channel per topic, after
//! the minimum of shaping:
//! - quote: last usable record of the batch → `Quote`
//! - position: first record for the tracked symbol → `Position`
//! - order: batch republished as-is
//!
//! The adapter is the only writer of these channels.

use crate::core::{Order, OrderBatch, Position, Quote, Topic};
use crate::exchanges::traits::{FeedBatch, RealtimeClient};
use crate::infrastructure::metrics::FeedMetrics;
use crate::{FeedError, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What to do with a batch nothing usable can be extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSymbolPolicy {
    /// Drop it silently
    #[default]
    Ignore,
    /// Drop it and log a warning
    Warn,
    /// Stop the adapter with `FeedError::MalformedPayload`
    Fail,
}

/// Per-topic raw channels
pub struct RawChannels {
    pub quote: broadcast::Sender<Quote>,
    pub position: broadcast::Sender<Position>,
    pub order: broadcast::Sender<OrderBatch>,
}

impl RawChannels {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            quote: broadcast::channel(capacity).0,
            position: broadcast::channel(capacity).0,
            order: broadcast::channel(capacity).0,
        }
    }
}

/// Quote table row (fields we read)
#[derive(Debug, Deserialize)]
struct QuoteRow {
    #[serde(rename = "bidPrice")]
    bid_price: Option<f64>,
    #[serde(rename = "askPrice")]
    ask_price: Option<f64>,
}

/// Position table row (fields we read)
#[derive(Debug, Deserialize)]
struct PositionRow {
    symbol: String,
    #[serde(rename = "avgEntryPrice", default)]
    avg_entry_price: Option<f64>,
    #[serde(rename = "currentQty", default)]
    current_qty: Option<f64>,
}

/// Top of book from a quote batch
///
/// Uses the last record for `symbol`; records without a symbol are accepted.
/// If that record is unusable the batch yields nothing, older records are
/// never promoted.
pub fn extract_quote(rows: &[Value], symbol: &str) -> Option<Quote> {
    let row = rows.iter().rev().find(|row| match row.get("symbol") {
        None | Some(Value::Null) => true,
        Some(s) => s.as_str() == Some(symbol),
    })?;
    let row = QuoteRow::deserialize(row).ok()?;
    Quote::from_f64(row.bid_price?, row.ask_price?)
}

/// Position for `symbol` from a position batch
///
/// The first matching record wins. A record without `currentQty` is unusable.
pub fn extract_position(rows: &[Value], symbol: &str) -> Option<Position> {
    let row = rows
        .iter()
        .filter_map(|row| PositionRow::deserialize(row).ok())
        .find(|row| row.symbol == symbol)?;
    let quantity = Decimal::from_f64(row.current_qty?)?;
    let price = row.avg_entry_price.and_then(Decimal::from_f64);
    Some(Position::new(price, quantity))
}

/// Raw feed adapter for one instrument
pub struct FeedAdapter {
    symbol: String,
    channels: RawChannels,
    policy: MissingSymbolPolicy,
    metrics: Arc<FeedMetrics>,
}

impl FeedAdapter {
    pub fn new(
        symbol: impl Into<String>,
        capacity: usize,
        policy: MissingSymbolPolicy,
        metrics: Arc<FeedMetrics>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            channels: RawChannels::new(capacity),
            policy,
            metrics,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn channels(&self) -> &RawChannels {
        &self.channels
    }

    /// Shape one batch and publish it on its topic channel
    pub fn publish(&self, batch: FeedBatch) -> Result<()> {
        self.metrics.record_batch(batch.topic);

        // Send errors only mean nobody is listening right now
        match batch.topic {
            Topic::Quote => match extract_quote(&batch.rows, &self.symbol) {
                Some(quote) => {
                    let _ = self.channels.quote.send(quote);
                }
                None => return self.omit(Topic::Quote, batch.rows.len()),
            },
            Topic::Position => match extract_position(&batch.rows, &self.symbol) {
                Some(position) => {
                    let _ = self.channels.position.send(position);
                }
                None => return self.omit(Topic::Position, batch.rows.len()),
            },
            Topic::Order => {
                let orders = batch.rows.into_iter().map(Order::new).collect();
                let _ = self.channels.order.send(OrderBatch::new(orders));
            }
        }
        Ok(())
    }

    fn omit(&self, topic: Topic, rows: usize) -> Result<()> {
        self.metrics.record_omitted();
        match self.policy {
            MissingSymbolPolicy::Ignore => Ok(()),
            MissingSymbolPolicy::Warn => {
                tracing::warn!(
                    target: "feed",
                    "{} batch of {} rows has no usable entry for {}",
                    topic.name(),
                    rows,
                    self.symbol
                );
                Ok(())
            }
            MissingSymbolPolicy::Fail => Err(FeedError::MalformedPayload {
                topic: topic.name(),
                reason: format!("no usable entry for {} in {} rows", self.symbol, rows),
            }),
        }
    }

    /// Pump batches from `client` until it closes
    pub async fn run<C: RealtimeClient>(&self, client: &mut C) -> Result<()> {
        tracing::info!(target: "feed", "Feed adapter running for {} on {}", self.symbol, client.name());

        while let Some(batch) = client.next_batch().await? {
            self.publish(batch)?;
        }

        tracing::warn!(target: "feed", "{} connection closed", client.name());
        Ok(())
    }
}
