//! Equal-weight progress accumulation over a fixed number of units.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Combined completion fraction of N equally weighted units.
///
/// Each unit contributes a value in `[0, 1]`; the published fraction is the
/// sum of contributions divided by N. The fraction never decreases and is
/// exactly `1.0` once every unit is complete.
///
/// # Examples
///
/// ```
/// use progress_fetch::ProgressGroup;
///
/// let group = ProgressGroup::new(2);
/// let first = group.unit(0).unwrap();
/// first.report(0.5);
/// assert_eq!(group.fraction(), 0.25);
/// first.complete();
/// group.unit(1).unwrap().complete();
/// assert_eq!(group.fraction(), 1.0);
/// ```
#[derive(Clone)]
pub struct ProgressGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    total_units: usize,
    state: Mutex<GroupState>,
    fraction: watch::Sender<f64>,
}

struct GroupState {
    contributions: Vec<f64>,
    completed: Vec<bool>,
    completed_count: usize,
    sum: f64,
}

impl GroupInner {
    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &GroupState) {
        let value = if state.completed_count == self.total_units {
            1.0
        } else {
            (state.sum / self.total_units as f64).clamp(0.0, 1.0)
        };
        self.fraction.send_if_modified(|current| {
            if value > *current {
                *current = value;
                true
            } else {
                false
            }
        });
    }
}

impl ProgressGroup {
    /// Create a group of `total_units` units. An empty group is complete.
    pub fn new(total_units: usize) -> Self {
        let initial = if total_units == 0 { 1.0 } else { 0.0 };
        let (fraction, _) = watch::channel(initial);
        Self {
            inner: Arc::new(GroupInner {
                total_units,
                state: Mutex::new(GroupState {
                    contributions: vec![0.0; total_units],
                    completed: vec![false; total_units],
                    completed_count: 0,
                    sum: 0.0,
                }),
                fraction,
            }),
        }
    }

    /// Handle for the unit at `index`, or `None` if out of range.
    pub fn unit(&self, index: usize) -> Option<ProgressUnit> {
        (index < self.inner.total_units).then(|| ProgressUnit {
            inner: Arc::clone(&self.inner),
            index,
        })
    }

    pub fn total_units(&self) -> usize {
        self.inner.total_units
    }

    /// Current combined fraction.
    pub fn fraction(&self) -> f64 {
        *self.inner.fraction.borrow()
    }

    /// Number of units marked complete.
    pub fn completed_units(&self) -> usize {
        self.inner.lock().completed_count
    }

    /// Stream of the combined fraction.
    ///
    /// Yields the current value first, then each increase. Rapid updates may
    /// be coalesced. The stream ends once the group and all its unit handles
    /// are dropped.
    pub fn subscribe(&self) -> FractionStream {
        FractionStream {
            inner: WatchStream::new(self.inner.fraction.subscribe()),
        }
    }
}

/// One unit of a [`ProgressGroup`].
pub struct ProgressUnit {
    inner: Arc<GroupInner>,
    index: usize,
}

impl ProgressUnit {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Report the in-flight fraction of this unit.
    ///
    /// Values are clamped to `[0, 1]`. Lower values than already reported
    /// and reports after completion are ignored.
    pub fn report(&self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if state.completed[self.index] || fraction <= state.contributions[self.index] {
            return;
        }
        state.sum += fraction - state.contributions[self.index];
        state.contributions[self.index] = fraction;
        self.inner.publish(state);
    }

    /// Mark this unit complete. Only the first call has any effect.
    pub fn complete(&self) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if state.completed[self.index] {
            return;
        }
        state.sum += 1.0 - state.contributions[self.index];
        state.contributions[self.index] = 1.0;
        state.completed[self.index] = true;
        state.completed_count += 1;
        self.inner.publish(state);
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().completed[self.index]
    }
}

/// Stream of combined fractions from a [`ProgressGroup`].
pub struct FractionStream {
    inner: WatchStream<f64>,
}

impl Stream for FractionStream {
    type Item = f64;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<f64>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_empty_group_is_complete() {
        let group = ProgressGroup::new(0);
        assert_eq!(group.fraction(), 1.0);
        assert!(group.unit(0).is_none());
    }

    #[test]
    fn test_partial_contributions() {
        let group = ProgressGroup::new(4);
        group.unit(0).unwrap().report(0.5);
        group.unit(1).unwrap().complete();
        assert_eq!(group.fraction(), (0.5 + 1.0) / 4.0);
        assert_eq!(group.completed_units(), 1);
    }

    #[test]
    fn test_regressions_ignored() {
        let group = ProgressGroup::new(1);
        let unit = group.unit(0).unwrap();
        unit.report(0.6);
        unit.report(0.2);
        unit.report(f64::NAN);
        assert_eq!(group.fraction(), 0.6);
    }

    #[test]
    fn test_complete_once() {
        let group = ProgressGroup::new(2);
        let unit = group.unit(0).unwrap();
        unit.complete();
        unit.complete();
        unit.report(0.1);
        assert_eq!(group.fraction(), 0.5);
        assert!(unit.is_complete());
        assert_eq!(group.completed_units(), 1);
    }

    #[test]
    fn test_all_complete_is_exactly_one() {
        let group = ProgressGroup::new(3);
        for index in 0..3 {
            let unit = group.unit(index).unwrap();
            unit.report(1.0 / 3.0);
            unit.complete();
        }
        assert_eq!(group.fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_stream_ends_with_last_value() {
        let group = ProgressGroup::new(2);
        let stream = group.subscribe();
        let units: Vec<_> = (0..2).map(|i| group.unit(i).unwrap()).collect();
        drop(group);

        for unit in &units {
            unit.complete();
        }
        drop(units);

        let values: Vec<f64> = stream.collect().await;
        assert_eq!(values.last().copied(), Some(1.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_concurrent_writers() {
        let group = ProgressGroup::new(8);
        std::thread::scope(|scope| {
            for index in 0..8 {
                let unit = group.unit(index).unwrap();
                scope.spawn(move || {
                    for step in 1..=100 {
                        unit.report(step as f64 / 100.0);
                    }
                    unit.complete();
                });
            }
        });
        assert_eq!(group.fraction(), 1.0);
        assert_eq!(group.completed_units(), 8);
    }
}
