//! Change detection
//!
//! Compares each value with the last *emitted* value, not the last seen one,
//! so a slow drift that stays within tolerance step by step still emits once
//! it leaves the tolerance of the emitted value.

use crate::stream::shared::SharedStream;
use tokio::sync::broadcast::{self, error::RecvError};

/// Stateful distinct-until-changed filter
#[derive(Debug, Clone)]
pub struct DistinctUntilChanged<T, F> {
    last: Option<T>,
    same: F,
}

impl<T: Clone, F: Fn(&T, &T) -> bool> DistinctUntilChanged<T, F> {
    pub fn new(same: F) -> Self {
        Self { last: None, same }
    }

    /// Returns true (and remembers `value`) if it differs from the last emitted value
    #[inline]
    pub fn admit(&mut self, value: &T) -> bool {
        match &self.last {
            Some(prev) if (self.same)(prev, value) => false,
            _ => {
                self.last = Some(value.clone());
                true
            }
        }
    }

    /// Last emitted value
    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

/// Shared stream that republishes `source` values only when they change
///
/// `tap` runs once per emitted value, before fan-out.
pub fn distinct_until_changed<T, S, K>(
    name: &'static str,
    capacity: usize,
    source: broadcast::WeakSender<T>,
    same: S,
    tap: K,
) -> SharedStream<T>
where
    T: Clone + Send + Sync + 'static,
    S: Fn(&T, &T) -> bool + Clone + Send + Sync + 'static,
    K: Fn(&T) + Clone + Send + Sync + 'static,
{
    SharedStream::new(name, capacity, move |emitter| {
        let rx = source.upgrade().map(|tx| tx.subscribe());
        let same = same.clone();
        let tap = tap.clone();
        tokio::spawn(async move {
            let Some(mut rx) = rx else {
                emitter.complete();
                return;
            };
            let mut filter = DistinctUntilChanged::new(same);
            loop {
                match rx.recv().await {
                    Ok(value) => {
                        if filter.admit(&value) {
                            tap(&value);
                            emitter.next(value);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "stream", "{} lagged, skipped {} raw values", name, skipped);
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_suppresses_consecutive_duplicates() {
        let mut filter = DistinctUntilChanged::new(|a: &i32, b: &i32| a == b);
        let admitted: Vec<i32> = [1, 1, 2, 2, 2, 1, 3, 3]
            .into_iter()
            .filter(|v| filter.admit(v))
            .collect();
        assert_eq!(admitted, vec![1, 2, 1, 3]);
        assert_eq!(filter.last(), Some(&3));
    }

    #[test]
    fn test_compares_against_last_emitted() {
        // Within 2 of the emitted value counts as the same
        let mut filter = DistinctUntilChanged::new(|a: &i32, b: &i32| (a - b).abs() <= 2);
        assert!(filter.admit(&10));
        assert!(!filter.admit(&11));
        assert!(!filter.admit(&12));
        // 13 is within 2 of 12 (last seen) but not of 10 (last emitted)
        assert!(filter.admit(&13));
    }

    proptest! {
        #[test]
        fn prop_emits_iff_differs_from_previous_emitted(values in proptest::collection::vec(0u8..4, 0..64)) {
            let mut filter = DistinctUntilChanged::new(|a: &u8, b: &u8| a == b);
            let mut emitted: Vec<u8> = Vec::new();
            for v in &values {
                let expected = emitted.last() != Some(v);
                prop_assert_eq!(filter.admit(v), expected);
                if expected {
                    emitted.push(*v);
                }
            }
            // No two adjacent emissions are equal
            prop_assert!(emitted.windows(2).all(|w| w[0] != w[1]));
        }
    }
}
