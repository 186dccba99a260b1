//! Feed metrics
//!
//! Lock-free counters updated by the adapter and the stream producers.

use crate::core::Topic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

/// Feed metrics collector
///
/// Shared through `Arc`; snapshots are taken for logging.
pub struct FeedMetrics {
    /// Raw batches received per topic
    quote_batches: AtomicU64,
    position_batches: AtomicU64,
    order_batches: AtomicU64,
    /// Batches dropped because nothing usable could be extracted
    omitted_batches: AtomicU64,
    /// Emissions on the deduplicated streams
    quote_changes: AtomicU64,
    position_changes: AtomicU64,
    /// Open order snapshots
    snapshots_delivered: AtomicU64,
    snapshots_discarded: AtomicU64,
    snapshot_failures: AtomicU64,
    /// Last raw batch timestamp (Unix millis)
    last_batch_time: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub quote_batches: u64,
    pub position_batches: u64,
    pub order_batches: u64,
    pub omitted_batches: u64,
    pub quote_changes: u64,
    pub position_changes: u64,
    pub snapshots_delivered: u64,
    pub snapshots_discarded: u64,
    pub snapshot_failures: u64,
    pub last_batch_time: u64,
    pub uptime_seconds: u64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            quote_batches: AtomicU64::new(0),
            position_batches: AtomicU64::new(0),
            order_batches: AtomicU64::new(0),
            omitted_batches: AtomicU64::new(0),
            quote_changes: AtomicU64::new(0),
            position_changes: AtomicU64::new(0),
            snapshots_delivered: AtomicU64::new(0),
            snapshots_discarded: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
            last_batch_time: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a raw batch from the upstream client
    #[inline]
    pub fn record_batch(&self, topic: Topic) {
        let counter = match topic {
            Topic::Quote => &self.quote_batches,
            Topic::Position => &self.position_batches,
            Topic::Order => &self.order_batches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.update_last_batch_time();
    }

    #[inline]
    pub fn record_omitted(&self) {
        self.omitted_batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_quote_change(&self) {
        self.quote_changes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_change(&self) {
        self.position_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_delivered(&self) {
        self.snapshots_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetch finished after a newer one was triggered
    pub fn record_snapshot_discarded(&self) {
        self.snapshots_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn update_last_batch_time(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_batch_time.store(now, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            quote_batches: self.quote_batches.load(Ordering::Relaxed),
            position_batches: self.position_batches.load(Ordering::Relaxed),
            order_batches: self.order_batches.load(Ordering::Relaxed),
            omitted_batches: self.omitted_batches.load(Ordering::Relaxed),
            quote_changes: self.quote_changes.load(Ordering::Relaxed),
            position_changes: self.position_changes.load(Ordering::Relaxed),
            snapshots_delivered: self.snapshots_delivered.load(Ordering::Relaxed),
            snapshots_discarded: self.snapshots_discarded.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            last_batch_time: self.last_batch_time.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}
