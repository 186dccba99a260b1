//! Feed context
//!
//! Built once at startup and passed around explicitly. Owns the raw adapter
//! (the only writer of the raw channels) and the four public streams derived
//! from it. Stream handles are cheap clones; they outlive the context and
//! complete once `run` returns.

use crate::core::{OrderBatch, OrderSnapshot, Position, Quote};
use crate::exchanges::traits::RealtimeClient;
use crate::feed::FeedAdapter;
use crate::infrastructure::config::{Config, FeedConfig};
use crate::infrastructure::metrics::FeedMetrics;
use crate::pipeline::{open_orders, order_events, position_changes, quote_changes};
use crate::rest::{Credentials, OrderSource, RequestSigner, RestClient};
use crate::stream::SharedStream;
use crate::Result;
use std::sync::Arc;

/// Everything the streams share
pub struct FeedContext {
    adapter: FeedAdapter,
    metrics: Arc<FeedMetrics>,
    quote: SharedStream<Quote>,
    position: SharedStream<Position>,
    order_events: SharedStream<OrderBatch>,
    open_orders: SharedStream<OrderSnapshot>,
}

impl FeedContext {
    /// Wire the streams for `config.symbol`, fetching snapshots from `orders`
    pub fn new<S: OrderSource>(config: &FeedConfig, orders: Arc<S>) -> Self {
        let metrics = Arc::new(FeedMetrics::new());
        let capacity = config.channel_capacity;
        let adapter = FeedAdapter::new(
            config.symbol.clone(),
            capacity,
            config.missing_symbol,
            metrics.clone(),
        );

        let channels = adapter.channels();
        let quote = quote_changes(&channels.quote, metrics.clone(), capacity);
        let position = position_changes(&channels.position, metrics.clone(), capacity);
        let order_events = order_events(&channels.order, capacity);
        let open_orders = open_orders(&channels.order, orders, metrics.clone(), capacity);

        tracing::info!(
            target: "feed",
            "Feed context for {} (capacity {}, missing symbol: {:?})",
            config.symbol,
            capacity,
            config.missing_symbol
        );

        Self {
            adapter,
            metrics,
            quote,
            position,
            order_events,
            open_orders,
        }
    }

    /// Context backed by the signed REST client
    pub fn from_config(config: &Config, credentials: Credentials) -> Result<Self> {
        let rest = RestClient::new(config.rest.base_url.clone(), RequestSigner::new(credentials))?;
        Ok(Self::new(&config.feed, Arc::new(rest)))
    }

    pub fn symbol(&self) -> &str {
        self.adapter.symbol()
    }

    /// Top of book, emitted when bid or ask changes
    pub fn quote(&self) -> SharedStream<Quote> {
        self.quote.clone()
    }

    /// Position, emitted when quantity or the cent-rounded price changes
    pub fn position(&self) -> SharedStream<Position> {
        self.position.clone()
    }

    /// Every raw order batch
    pub fn order_events(&self) -> SharedStream<OrderBatch> {
        self.order_events.clone()
    }

    /// Latest open orders snapshot
    pub fn open_orders(&self) -> SharedStream<OrderSnapshot> {
        self.open_orders.clone()
    }

    pub fn adapter(&self) -> &FeedAdapter {
        &self.adapter
    }

    pub fn metrics(&self) -> Arc<FeedMetrics> {
        self.metrics.clone()
    }

    /// Pump `client` into the streams until it closes
    ///
    /// Consumes the context: when this returns the raw channels are gone and
    /// every stream completes.
    pub async fn run<C: RealtimeClient>(self, client: &mut C) -> Result<()> {
        let result = self.adapter.run(client).await;
        let stats = self.metrics.snapshot();
        tracing::info!(
            target: "feed",
            "Feed stopped: {} quote, {} position, {} order batches; {} snapshots delivered",
            stats.quote_batches,
            stats.position_batches,
            stats.order_batches,
            stats.snapshots_delivered
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Topic;
    use crate::exchanges::traits::FeedBatch;
    use crate::feed::MissingSymbolPolicy;
    use crate::test_utils::{next, order_row, position_row, quote_row, snapshot_of, GatedSource, ScriptedClient};
    use rust_decimal::Decimal;

    fn config() -> FeedConfig {
        FeedConfig {
            channel_capacity: 16,
            ..FeedConfig::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let (source, mut fetches) = GatedSource::new();
        let context = FeedContext::new(&config(), source);
        let (mut client, batches) = ScriptedClient::new();

        let mut quotes = context.quote().subscribe();
        let mut positions = context.position().subscribe();
        let mut events = context.order_events().subscribe();
        let mut open = context.open_orders().subscribe();
        let metrics = context.metrics();

        // Activation fetch
        fetches.recv().await.unwrap().send(Ok(snapshot_of(&["a"]))).unwrap();
        assert_eq!(next(&mut open).await.unwrap().unwrap().len(), 1);

        let feed = tokio::spawn(async move { context.run(&mut client).await });

        batches.send(FeedBatch::new(Topic::Quote, vec![quote_row("XBTUSD", 10.0, 11.0)])).unwrap();
        batches.send(FeedBatch::new(Topic::Quote, vec![quote_row("XBTUSD", 10.0, 11.0)])).unwrap();
        batches.send(FeedBatch::new(Topic::Quote, vec![quote_row("XBTUSD", 10.5, 11.0)])).unwrap();
        batches
            .send(FeedBatch::new(Topic::Position, vec![position_row("XBTUSD", Some(100.001), 5.0)]))
            .unwrap();
        batches
            .send(FeedBatch::new(Topic::Position, vec![position_row("XBTUSD", Some(100.004), 5.0)]))
            .unwrap();
        batches.send(FeedBatch::new(Topic::Order, vec![order_row("b", "New")])).unwrap();

        assert_eq!(next(&mut quotes).await.unwrap().unwrap().bid, Decimal::from(10));
        assert_eq!(next(&mut quotes).await.unwrap().unwrap().bid, Decimal::new(105, 1));
        assert_eq!(next(&mut positions).await.unwrap().unwrap().quantity, Decimal::from(5));
        assert_eq!(next(&mut events).await.unwrap().unwrap()[0].order_id(), Some("b"));

        fetches.recv().await.unwrap().send(Ok(snapshot_of(&["a", "b"]))).unwrap();
        assert_eq!(next(&mut open).await.unwrap().unwrap().len(), 2);

        // Upstream closed: every stream completes
        drop(batches);
        feed.await.unwrap().unwrap();
        assert!(next(&mut quotes).await.is_none());
        assert!(next(&mut positions).await.is_none());
        assert!(next(&mut events).await.is_none());
        assert!(next(&mut open).await.is_none());

        let stats = metrics.snapshot();
        assert_eq!(stats.quote_batches, 3);
        assert_eq!(stats.quote_changes, 2);
        assert_eq!(stats.position_changes, 1);
    }

    #[tokio::test]
    async fn test_failing_policy_stops_run() {
        let (source, _fetches) = GatedSource::new();
        let context = FeedContext::new(
            &FeedConfig {
                missing_symbol: MissingSymbolPolicy::Fail,
                ..config()
            },
            source,
        );
        let (mut client, batches) = ScriptedClient::new();
        let mut positions = context.position().subscribe();

        batches
            .send(FeedBatch::new(Topic::Position, vec![position_row("ETHUSD", Some(1.0), 1.0)]))
            .unwrap();
        let err = context.run(&mut client).await.unwrap_err();
        assert!(matches!(err, crate::FeedError::MalformedPayload { .. }));
        assert!(next(&mut positions).await.is_none());
    }

    #[test]
    fn test_from_config() {
        let context = FeedContext::from_config(&Config::default(), Credentials::default()).unwrap();
        assert_eq!(context.symbol(), "XBTUSD");
        assert_eq!(context.quote().subscriber_count(), 0);
    }
}
