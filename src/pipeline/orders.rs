//! Order stream composer
//!
//! Two outputs over the raw order channel:
//! - order events: every batch, untouched
//! - open orders: a REST snapshot fetched at activation and again after every
//!   order event, switch-to-latest
//!
//! Open orders are always re-queried rather than rebuilt from push deltas;
//! the exchange's order deltas are not reliable enough to maintain a book.
//! Each fetch runs in its own task and is never aborted; a result whose
//! generation has been superseded is dropped.

use crate::core::{OrderBatch, OrderSnapshot};
use crate::infrastructure::metrics::FeedMetrics;
use crate::rest::{ExchangeRequestError, OrderSource};
use crate::stream::{Emitter, SharedStream, SwitchLatest};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;

type FetchResult = Result<OrderSnapshot, ExchangeRequestError>;

/// Every order batch as received
pub fn order_events(source: &broadcast::Sender<OrderBatch>, capacity: usize) -> SharedStream<OrderBatch> {
    SharedStream::from_channel("order_events", capacity, source.downgrade(), |batch: &OrderBatch| {
        tracing::debug!(target: "order_events", rows = batch.len(), "order event");
    })
}

/// Open orders, refreshed on every order event
///
/// A fetch failure is delivered to subscribers and ends the activation.
pub fn open_orders<S: OrderSource>(
    source: &broadcast::Sender<OrderBatch>,
    orders: Arc<S>,
    metrics: Arc<FeedMetrics>,
    capacity: usize,
) -> SharedStream<OrderSnapshot> {
    let triggers = source.downgrade();
    SharedStream::new("orders", capacity, move |emitter| {
        let rx = triggers.upgrade().map(|tx| tx.subscribe());
        tokio::spawn(compose(rx, orders.clone(), metrics.clone(), emitter))
    })
}

fn spawn_fetch<S: OrderSource>(
    orders: &Arc<S>,
    generation: u64,
    done: &mpsc::UnboundedSender<(u64, FetchResult)>,
) {
    let orders = orders.clone();
    let done = done.clone();
    tokio::spawn(async move {
        let result = orders.fetch_open_orders().await;
        // Receiver gone means the stream was torn down; the result is moot
        let _ = done.send((generation, result));
    });
}

async fn compose<S: OrderSource>(
    triggers: Option<broadcast::Receiver<OrderBatch>>,
    orders: Arc<S>,
    metrics: Arc<FeedMetrics>,
    emitter: Emitter<OrderSnapshot>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut switch = SwitchLatest::new();

    // Time zero: one fetch before any order event
    spawn_fetch(&orders, switch.trigger(), &done_tx);

    let mut upstream_open = triggers.is_some();
    let mut triggers = triggers;

    loop {
        tokio::select! {
            event = recv_trigger(&mut triggers), if upstream_open => match event {
                Ok(()) => {
                    let generation = switch.trigger();
                    tracing::trace!(target: "orders", generation, "order event, refreshing snapshot");
                    spawn_fetch(&orders, generation, &done_tx);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed events still mean the book changed
                    tracing::warn!(target: "orders", "order events lagged, skipped {}", skipped);
                    spawn_fetch(&orders, switch.trigger(), &done_tx);
                }
                Err(RecvError::Closed) => {
                    upstream_open = false;
                    if !switch.is_pending() {
                        emitter.complete();
                        break;
                    }
                }
            },
            Some((generation, result)) = done_rx.recv() => {
                if !switch.resolve(generation) {
                    metrics.record_snapshot_discarded();
                    tracing::debug!(
                        target: "orders",
                        generation,
                        latest = switch.generation(),
                        "discarding superseded snapshot"
                    );
                    continue;
                }
                match result {
                    Ok(snapshot) => {
                        metrics.record_snapshot_delivered();
                        tracing::debug!(target: "orders", open = snapshot.len(), generation, "open orders");
                        emitter.next(snapshot);
                    }
                    Err(error) => {
                        metrics.record_snapshot_failure();
                        tracing::error!(target: "orders", "open orders fetch failed: {}", error);
                        emitter.fail(error);
                        break;
                    }
                }
                if !upstream_open {
                    emitter.complete();
                    break;
                }
            }
        }
    }
}

async fn recv_trigger(rx: &mut Option<broadcast::Receiver<OrderBatch>>) -> Result<(), RecvError> {
    match rx {
        Some(rx) => rx.recv().await.map(|_| ()),
        None => Err(RecvError::Closed),
    }
}
