//! Reference-counted multicast stream
//!
//! A `SharedStream` owns one producer task per activation, no matter how many
//! subscribers are attached:
//! - the first `subscribe()` spawns the producer
//! - every subscriber reads the same broadcast output
//! - dropping the last `Subscription` aborts the producer
//!
//! A producer that terminated (failure or completion) is spawned again by the
//! next `subscribe()`. Output is tagged with the activation that produced it;
//! a subscriber ignores anything from activations older than the one it joined.

use crate::rest::ExchangeRequestError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Default per-stream output buffer
pub const DEFAULT_CAPACITY: usize = 1024;

/// Item carried on a stream's output channel
#[derive(Debug, Clone)]
enum Signal<T> {
    Next(T),
    Failed(ExchangeRequestError),
    Completed,
}

/// Signal plus the activation that sent it
#[derive(Debug, Clone)]
struct Tagged<T> {
    activation: u64,
    signal: Signal<T>,
}

/// Producer side handed to an activation
pub struct Emitter<T> {
    tx: broadcast::Sender<Tagged<T>>,
    activation: u64,
    terminated: Arc<AtomicBool>,
}

impl<T> Emitter<T> {
    fn send(&self, signal: Signal<T>) {
        // No receivers is fine: the signal is simply not observed
        let _ = self.tx.send(Tagged {
            activation: self.activation,
            signal,
        });
    }

    /// Deliver a value to every current subscriber
    #[inline]
    pub fn next(&self, value: T) {
        self.send(Signal::Next(value));
    }

    /// Terminate the activation with an error
    pub fn fail(&self, error: ExchangeRequestError) {
        self.terminated.store(true, Ordering::Release);
        self.send(Signal::Failed(error));
    }

    /// Terminate the activation normally
    pub fn complete(&self) {
        self.terminated.store(true, Ordering::Release);
        self.send(Signal::Completed);
    }

    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

type Activate<T> = Box<dyn Fn(Emitter<T>) -> JoinHandle<()> + Send + Sync>;

struct Producer {
    handle: JoinHandle<()>,
    terminated: Arc<AtomicBool>,
}

impl Producer {
    fn is_running(&self) -> bool {
        !self.terminated.load(Ordering::Acquire) && !self.handle.is_finished()
    }
}

#[derive(Default)]
struct State {
    subscribers: usize,
    producer: Option<Producer>,
    activations: u64,
}

struct Inner<T> {
    name: &'static str,
    tx: broadcast::Sender<Tagged<T>>,
    state: Mutex<State>,
    activate: Activate<T>,
}

/// Hot, shared stream of `T`
pub struct SharedStream<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> SharedStream<T> {
    /// Create a stream whose producer is started by `activate`
    ///
    /// `activate` must subscribe to its sources before returning, so that
    /// nothing published after `subscribe()` returns is missed.
    pub fn new<F>(name: &'static str, capacity: usize, activate: F) -> Self
    where
        F: Fn(Emitter<T>) -> JoinHandle<()> + Send + Sync + 'static,
    {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                name,
                tx,
                state: Mutex::new(State::default()),
                activate: Box::new(activate),
            }),
        }
    }

    /// Multicast every value of a broadcast source, calling `tap` once per value
    ///
    /// `source` is held weakly; the stream completes once every strong sender
    /// is gone.
    pub fn from_channel<K>(
        name: &'static str,
        capacity: usize,
        source: broadcast::WeakSender<T>,
        tap: K,
    ) -> Self
    where
        T: Sync,
        K: Fn(&T) + Clone + Send + Sync + 'static,
    {
        Self::new(name, capacity, move |emitter| {
            let rx = source.upgrade().map(|tx| tx.subscribe());
            let tap = tap.clone();
            tokio::spawn(async move {
                let Some(mut rx) = rx else {
                    emitter.complete();
                    return;
                };
                loop {
                    match rx.recv().await {
                        Ok(value) => {
                            tap(&value);
                            emitter.next(value);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(target: "stream", "{} lagged, skipped {} values", name, skipped);
                        }
                        Err(RecvError::Closed) => {
                            emitter.complete();
                            break;
                        }
                    }
                }
            })
        })
    }

    /// Register a subscriber, activating the producer if needed
    pub fn subscribe(&self) -> Subscription<T> {
        let mut state = self.inner.state.lock();
        let rx = self.inner.tx.subscribe();
        state.subscribers += 1;

        let running = state.producer.as_ref().is_some_and(Producer::is_running);
        if !running {
            if let Some(old) = state.producer.take() {
                old.handle.abort();
            }
            state.activations += 1;
            let terminated = Arc::new(AtomicBool::new(false));
            let emitter = Emitter {
                tx: self.inner.tx.clone(),
                activation: state.activations,
                terminated: terminated.clone(),
            };
            tracing::debug!(target: "stream", "{} activated (#{})", self.inner.name, state.activations);
            state.producer = Some(Producer {
                handle: (self.inner.activate)(emitter),
                terminated,
            });
        }

        Subscription {
            rx,
            activation: state.activations,
            inner: self.inner.clone(),
            done: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

impl<T> SharedStream<T> {
    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers
    }

    /// True while a producer is attached and has not terminated
    pub fn is_active(&self) -> bool {
        self.inner
            .state
            .lock()
            .producer
            .as_ref()
            .is_some_and(Producer::is_running)
    }

    /// How many times the producer has been started
    pub fn activations(&self) -> u64 {
        self.inner.state.lock().activations
    }
}

/// One subscriber's view of a `SharedStream`
///
/// Dropping it unregisters the subscriber.
pub struct Subscription<T> {
    rx: broadcast::Receiver<Tagged<T>>,
    /// Activation current when this subscriber joined
    activation: u64,
    inner: Arc<Inner<T>>,
    done: bool,
}

impl<T: Clone> Subscription<T> {
    /// Next value
    ///
    /// `Some(Err(_))` is delivered once when the producer fails; afterwards,
    /// and after completion, this returns `None`.
    pub async fn recv(&mut self) -> Option<Result<T, ExchangeRequestError>> {
        if self.done {
            return None;
        }
        loop {
            let signal = match self.rx.recv().await {
                Ok(tagged) if tagged.activation < self.activation => continue,
                Ok(tagged) => Ok(tagged.signal),
                Err(e) => Err(e),
            };
            match signal {
                Ok(Signal::Next(value)) => return Some(Ok(value)),
                Ok(Signal::Failed(error)) => {
                    self.done = true;
                    return Some(Err(error));
                }
                Ok(Signal::Completed) | Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "stream", "{} subscriber lagged, skipped {} items", self.inner.name, skipped);
                }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 {
            if let Some(producer) = state.producer.take() {
                producer.handle.abort();
                tracing::debug!(target: "stream", "{} deactivated", self.inner.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::next;
    use std::sync::atomic::AtomicUsize;

    fn counted_stream(source: &broadcast::Sender<u32>, taps: Arc<AtomicUsize>) -> SharedStream<u32> {
        SharedStream::from_channel("test", 16, source.downgrade(), move |_| {
            taps.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_lazy_activation() {
        let (source, _) = broadcast::channel(16);
        let stream = counted_stream(&source, Arc::new(AtomicUsize::new(0)));
        assert!(!stream.is_active());
        assert_eq!(source.receiver_count(), 0);

        let _sub = stream.subscribe();
        assert!(stream.is_active());
        assert_eq!(source.receiver_count(), 1);
    }

    #[tokio::test]
    async fn test_recv_waits_for_values() {
        let (source, _) = broadcast::channel(16);
        let stream = counted_stream(&source, Arc::new(AtomicUsize::new(0)));
        let mut sub = stream.subscribe();

        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());
        drop(recv);

        source.send(5).unwrap();
        assert_eq!(next(&mut sub).await, Some(Ok(5)));
    }

    #[tokio::test]
    async fn test_single_upstream_for_many_subscribers() {
        let (source, _) = broadcast::channel(16);
        let taps = Arc::new(AtomicUsize::new(0));
        let stream = counted_stream(&source, taps.clone());

        let mut a = stream.subscribe();
        let mut b = stream.subscribe();
        assert_eq!(source.receiver_count(), 1);
        assert_eq!(stream.activations(), 1);

        for v in [1, 2, 3] {
            source.send(v).unwrap();
        }
        for v in [1, 2, 3] {
            assert_eq!(next(&mut a).await, Some(Ok(v)));
            assert_eq!(next(&mut b).await, Some(Ok(v)));
        }
        assert_eq!(taps.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_last_unsubscribe_stops_producer() {
        let (source, _) = broadcast::channel::<u32>(16);
        let stream = counted_stream(&source, Arc::new(AtomicUsize::new(0)));

        let a = stream.subscribe();
        let b = stream.subscribe();
        drop(a);
        assert!(stream.is_active());
        assert_eq!(stream.subscriber_count(), 1);
        drop(b);
        assert!(!stream.is_active());
        assert_eq!(stream.subscriber_count(), 0);

        // Aborted task releases its receiver
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while source.receiver_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_completes_when_source_dropped() {
        let (source, _) = broadcast::channel::<u32>(16);
        let stream = counted_stream(&source, Arc::new(AtomicUsize::new(0)));
        let mut sub = stream.subscribe();

        source.send(7).unwrap();
        drop(source);
        assert_eq!(next(&mut sub).await, Some(Ok(7)));
        assert_eq!(next(&mut sub).await, None);
        assert!(sub.is_done());
    }

    #[tokio::test]
    async fn test_failure_is_delivered_once_and_reactivates() {
        let stream: SharedStream<u32> = SharedStream::new("failing", 16, |emitter| {
            tokio::spawn(async move {
                emitter.next(1);
                emitter.fail(ExchangeRequestError::new("boom", None));
            })
        });

        let mut sub = stream.subscribe();
        assert_eq!(next(&mut sub).await, Some(Ok(1)));
        let err = next(&mut sub).await.unwrap().unwrap_err();
        assert_eq!(err.message, "boom");
        assert_eq!(next(&mut sub).await, None);

        let mut again = stream.subscribe();
        assert_eq!(stream.activations(), 2);
        assert_eq!(next(&mut again).await, Some(Ok(1)));
    }

    #[tokio::test]
    async fn test_ignores_signals_from_older_activation() {
        let emitters: Arc<Mutex<Vec<Emitter<u32>>>> = Arc::new(Mutex::new(Vec::new()));
        let slot = emitters.clone();
        let stream: SharedStream<u32> = SharedStream::new("held", 16, move |emitter| {
            slot.lock().push(emitter);
            tokio::spawn(std::future::pending())
        });

        drop(stream.subscribe());
        let mut sub = stream.subscribe();
        assert_eq!(stream.activations(), 2);

        // First activation was torn down but its emitter still fires
        emitters.lock()[0].fail(ExchangeRequestError::new("stale", None));
        emitters.lock()[1].next(5);
        assert_eq!(next(&mut sub).await, Some(Ok(5)));
        assert!(!sub.is_done());
    }

    #[tokio::test]
    async fn test_dropped_source_completes_new_activation() {
        let (source, _) = broadcast::channel::<u32>(16);
        let stream = counted_stream(&source, Arc::new(AtomicUsize::new(0)));
        drop(source);

        let mut sub = stream.subscribe();
        assert_eq!(next(&mut sub).await, None);
    }
}
