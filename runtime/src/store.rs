//! The state store.
//!
//! Holds the single canonical snapshot of application state. Snapshots are
//! immutable and shared as `Arc<S>`; every transition replaces the current
//! one wholesale through [`StateStore::apply`].
//!
//! # Single writer
//!
//! `apply` never runs two updaters at once. An `apply` issued from inside a
//! snapshot handler is queued and run by the same caller after its current
//! notification round. An `apply` from another thread waits until the
//! running one has finished, then applies its own updater before returning.
//! Each updater therefore always sees the snapshot produced by the previous
//! one.
//!
//! # Example
//!
//! ```ignore
//! let store = StateStore::new(SearchState::default());
//!
//! let _sub = store.subscribe_selected(
//!     |state| state.is_loading,
//!     |loading| println!("loading: {loading}"),
//! );
//!
//! store.apply(|state| SearchState { is_loading: true, ..state.clone() });
//! assert!(store.get_snapshot().is_loading);
//! ```

use crate::bus::Subscription;
use crate::metrics::StoreMetrics;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::Instant;
use tokio::sync::watch;

type SnapshotHandler<S> = Arc<dyn Fn(&S) + Send + Sync>;
type Updater<S> = Box<dyn FnOnce(&S) -> S + Send>;

struct StoreInner<S> {
    current: Arc<S>,
    subscribers: Vec<(u64, SnapshotHandler<S>)>,
    pending: VecDeque<Updater<S>>,
    /// Thread currently running updaters
    applier: Option<ThreadId>,
    next_id: u64,
}

/// Owner of the current state snapshot
///
/// Cloning a `StateStore` yields another handle to the same store.
pub struct StateStore<S> {
    inner: Arc<Mutex<StoreInner<S>>>,
    released: Arc<Condvar>,
    watch: Arc<watch::Sender<Arc<S>>>,
}

impl<S: Send + Sync + 'static> StateStore<S> {
    /// Create a store holding `initial`
    #[must_use]
    pub fn new(initial: S) -> Self {
        let current = Arc::new(initial);
        let (watch, _) = watch::channel(Arc::clone(&current));
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                current,
                subscribers: Vec::new(),
                pending: VecDeque::new(),
                applier: None,
                next_id: 0,
            })),
            released: Arc::new(Condvar::new()),
            watch: Arc::new(watch),
        }
    }

    /// The current snapshot
    #[must_use]
    pub fn get_snapshot(&self) -> Arc<S> {
        Arc::clone(&self.lock().current)
    }

    /// Compute a value from the current snapshot
    pub fn select<T>(&self, selector: impl FnOnce(&S) -> T) -> T {
        selector(&self.get_snapshot())
    }

    /// Replace the current snapshot with `updater(current)`
    ///
    /// Subscribers are notified synchronously, in subscription order,
    /// before this call returns. From inside a snapshot handler the updater
    /// is queued behind the current round and this call returns immediately;
    /// from another thread it waits for the running `apply` to finish.
    ///
    /// # Panics
    ///
    /// A panicking updater or subscriber unwinds through this call. The
    /// store keeps its last good snapshot and stays usable.
    pub fn apply<F>(&self, updater: F)
    where
        F: FnOnce(&S) -> S + Send + 'static,
    {
        let current = thread::current().id();
        {
            let mut inner = self.lock();
            if inner.applier == Some(current) {
                inner.pending.push_back(Box::new(updater));
                return;
            }
            while inner.applier.is_some() {
                inner = self
                    .released
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            inner.pending.push_back(Box::new(updater));
            inner.applier = Some(current);
        }

        let _turn = ApplyTurn { store: self };

        loop {
            let (updater, previous) = {
                let mut inner = self.lock();
                let Some(updater) = inner.pending.pop_front() else {
                    return;
                };
                (updater, Arc::clone(&inner.current))
            };

            let started = Instant::now();
            let next = Arc::new(updater(&previous));

            let handlers: SmallVec<[SnapshotHandler<S>; 8]> = {
                let mut inner = self.lock();
                inner.current = Arc::clone(&next);
                inner.subscribers.iter().map(|(_, h)| Arc::clone(h)).collect()
            };

            self.watch.send_replace(Arc::clone(&next));
            for handler in &handlers {
                handler(&next);
            }
            StoreMetrics::record_update(started.elapsed());
        }
    }

    /// Observe the current snapshot and every later one
    ///
    /// `handler` is called once immediately with the current snapshot, then
    /// after every `apply`.
    pub fn subscribe_to_snapshots<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let handler: SnapshotHandler<S> = Arc::new(handler);
        let (id, current) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::clone(&handler)));
            (id, Arc::clone(&inner.current))
        };

        handler(&current);

        let weak: Weak<Mutex<StoreInner<S>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|(sid, _)| *sid != id);
            }
        })
    }

    /// Observe a derived value, skipping snapshots where it did not change
    ///
    /// The value is compared with `PartialEq` against the last delivered one.
    pub fn subscribe_selected<T, Sel, F>(&self, selector: Sel, handler: F) -> Subscription
    where
        T: PartialEq + Send + Sync + 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_selected_by(selector, <T as PartialEq>::eq, handler)
    }

    /// Observe a derived value, skipping snapshots where `same` holds
    ///
    /// Use this when structural equality is too expensive or too strict,
    /// e.g. comparing lists by the sequence of their ids.
    pub fn subscribe_selected_by<T, Sel, Same, F>(
        &self,
        selector: Sel,
        same: Same,
        handler: F,
    ) -> Subscription
    where
        T: Send + Sync + 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        Same: Fn(&T, &T) -> bool + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let last: Mutex<Option<Arc<T>>> = Mutex::new(None);
        self.subscribe_to_snapshots(move |state| {
            let value = Arc::new(selector(state));
            {
                let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                if last.as_deref().is_some_and(|previous| same(previous, value.as_ref())) {
                    return;
                }
                *last = Some(Arc::clone(&value));
            }
            handler(value.as_ref());
        })
    }

    /// Async view of the snapshot stream
    ///
    /// Receivers see the latest snapshot; intermediate ones may be skipped
    /// if the receiver falls behind.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<S>> {
        self.watch.subscribe()
    }

    /// Number of live snapshot subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            released: Arc::clone(&self.released),
            watch: Arc::clone(&self.watch),
        }
    }
}

impl<S: fmt::Debug + Send + Sync + 'static> fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("StateStore")
            .field("current", &inner.current)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

/// Hands the writer turn back when `apply` returns or unwinds
struct ApplyTurn<'a, S: Send + Sync + 'static> {
    store: &'a StateStore<S>,
}

impl<S: Send + Sync + 'static> Drop for ApplyTurn<'_, S> {
    fn drop(&mut self) {
        self.store.lock().applier = None;
        self.store.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        value: u32,
        label: String,
    }

    #[test]
    fn test_snapshot_is_synchronous() {
        let store = StateStore::new(Counter::default());
        store.apply(|s| Counter { value: s.value + 1, ..s.clone() });
        assert_eq!(store.get_snapshot().value, 1);
        assert_eq!(store.select(|s| s.value * 10), 10);
    }

    #[test]
    fn test_subscribe_replays_current_then_live() {
        let store = StateStore::new(Counter { value: 5, label: String::new() });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe_to_snapshots(move |s: &Counter| sink.lock().unwrap().push(s.value));

        store.apply(|s| Counter { value: s.value + 1, ..s.clone() });
        store.apply(|s| Counter { value: s.value + 1, ..s.clone() });
        assert_eq!(*seen.lock().unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_subscribers_notified_in_order() {
        let store = StateStore::new(Counter::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let _a = store.subscribe_to_snapshots(move |s: &Counter| first.lock().unwrap().push(("a", s.value)));
        let _b = store.subscribe_to_snapshots(move |s: &Counter| second.lock().unwrap().push(("b", s.value)));

        store.apply(|_| Counter { value: 1, label: String::new() });
        assert_eq!(
            *order.lock().unwrap(),
            vec![("a", 0), ("b", 0), ("a", 1), ("b", 1)]
        );
    }

    #[test]
    fn test_selected_subscription_suppresses_unchanged_values() {
        let store = StateStore::new(Counter::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe_selected(|s: &Counter| s.value, move |v: &u32| sink.lock().unwrap().push(*v));

        store.apply(|s| Counter { label: "unrelated".into(), ..s.clone() });
        store.apply(|s| Counter { value: 3, ..s.clone() });
        store.apply(|s| Counter { label: "again".into(), ..s.clone() });
        assert_eq!(*seen.lock().unwrap(), vec![0, 3]);
    }

    #[test]
    fn test_custom_equivalence() {
        let store = StateStore::new(Counter::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        // Only the parity matters to this subscriber.
        let _sub = store.subscribe_selected_by(
            |s: &Counter| s.value,
            |a: &u32, b: &u32| a % 2 == b % 2,
            move |v: &u32| sink.lock().unwrap().push(*v),
        );

        for value in [2, 4, 5, 7, 8] {
            store.apply(move |s| Counter { value, ..s.clone() });
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 5, 8]);
    }

    #[test]
    fn test_apply_from_subscriber_is_queued() {
        let store = StateStore::new(Counter::default());
        let inner_store = store.clone();
        let _sub = store.subscribe_to_snapshots(move |s: &Counter| {
            if s.value == 1 {
                inner_store.apply(|s| Counter { value: s.value * 10, ..s.clone() });
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _observer = store.subscribe_to_snapshots(move |s: &Counter| sink.lock().unwrap().push(s.value));

        store.apply(|_| Counter { value: 1, label: String::new() });

        assert_eq!(store.get_snapshot().value, 10);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 10]);
    }

    #[test]
    fn test_apply_from_other_thread_is_visible_on_return() {
        let store = StateStore::new(Counter::default());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let _slow = store.subscribe_to_snapshots(move |s: &Counter| {
            if s.value == 1 {
                entered_tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
        });

        let first = {
            let store = store.clone();
            std::thread::spawn(move || store.apply(|s| Counter { value: 1, ..s.clone() }))
        };
        entered_rx.recv().unwrap();

        store.apply(|s| Counter {
            label: format!("after {}", s.value),
            ..s.clone()
        });
        assert_eq!(store.get_snapshot().label, "after 1");
        first.join().unwrap();
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = StateStore::new(Counter::default());
        let seen = Arc::new(Mutex::new(0_u32));
        let sink = Arc::clone(&seen);
        let sub = store.subscribe_to_snapshots(move |_| *sink.lock().unwrap() += 1);
        assert_eq!(store.subscriber_count(), 1);

        sub.unsubscribe();
        store.apply(|s| s.clone());
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_sees_latest_snapshot() {
        let store = StateStore::new(Counter::default());
        let mut rx = store.watch();
        assert_eq!(rx.borrow().value, 0);

        store.apply(|s| Counter { value: 42, ..s.clone() });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().value, 42);
    }
}
