//! Quote normalizer

use crate::core::Quote;
use crate::infrastructure::metrics::FeedMetrics;
use crate::stream::{distinct_until_changed, SharedStream};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Quote changes: emits when bid or ask differs from the last emitted quote
pub fn quote_changes(
    source: &broadcast::Sender<Quote>,
    metrics: Arc<FeedMetrics>,
    capacity: usize,
) -> SharedStream<Quote> {
    distinct_until_changed("quote", capacity, source.downgrade(), Quote::same_as, move |q: &Quote| {
        metrics.record_quote_change();
        tracing::debug!(target: "quote", bid = %q.bid, ask = %q.ask, "quote changed");
    })
}
