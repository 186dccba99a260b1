//! Position normalizer
//!
//! Average entry price carries float noise from fill averaging, so it is
//! compared at cent precision. Quantity is compared exactly.

use crate::core::Position;
use crate::infrastructure::metrics::FeedMetrics;
use crate::stream::{distinct_until_changed, SharedStream};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Position changes for the tracked symbol
pub fn position_changes(
    source: &broadcast::Sender<Position>,
    metrics: Arc<FeedMetrics>,
    capacity: usize,
) -> SharedStream<Position> {
    distinct_until_changed(
        "position",
        capacity,
        source.downgrade(),
        Position::same_as,
        move |p: &Position| {
            metrics.record_position_change();
            tracing::debug!(target: "position", price = ?p.price, quantity = %p.quantity, "position changed");
        },
    )
}
