//! The action bus.
//!
//! A synchronous multicast channel. [`ActionBus::publish`] delivers the
//! action to every current subscriber, in subscription order, before it
//! returns. Subscribers only see actions published after they subscribed;
//! nothing is replayed.
//!
//! # Re-entrant publishing
//!
//! A subscriber may publish while it is handling an action. The nested
//! action is queued and delivered once the outer action has reached every
//! remaining subscriber (trampoline semantics): delivery order is strict FIFO
//! across the whole cascade, and the call stack never grows with the depth of
//! a feedback loop.
//!
//! A publish from another thread while a dispatch is in progress waits for
//! that dispatch (and its whole cascade) to finish, then delivers its own
//! action before returning. Exactly one thread delivers actions at any time,
//! so a subscriber must not block on another thread that is publishing.
//!
//! # Example
//!
//! ```ignore
//! let bus = ActionBus::new();
//! let _subscription = bus
//!     .of_kind(&[SearchAction::QUERY_CHANGED])
//!     .subscribe(|action| tracing::info!(?action, "query changed"));
//!
//! bus.publish(SearchAction::QueryChanged { query: "king".into() });
//! ```

use crate::metrics::BusMetrics;
use composable_effects_core::action::{Action, KindFilter};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::Instant;

type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Subscriber<A> {
    id: u64,
    filter: KindFilter,
    handler: Handler<A>,
}

struct BusInner<A> {
    subscribers: Vec<Subscriber<A>>,
    pending: VecDeque<A>,
    /// Thread currently delivering actions
    dispatcher: Option<ThreadId>,
    next_id: u64,
}

struct BusShared<A> {
    state: Mutex<BusInner<A>>,
    released: Condvar,
}

/// Multicast channel for actions
///
/// Cloning an `ActionBus` yields another handle to the same bus.
pub struct ActionBus<A> {
    inner: Arc<BusShared<A>>,
}

impl<A: Action> ActionBus<A> {
    /// Create a bus with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusShared {
                state: Mutex::new(BusInner {
                    subscribers: Vec::new(),
                    pending: VecDeque::new(),
                    dispatcher: None,
                    next_id: 0,
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Publish an action to every current subscriber
    ///
    /// Returns once the action, and everything published while delivering
    /// it, has been delivered. Called from a subscriber on the dispatching
    /// thread, the action is queued behind the current one and this call
    /// returns immediately. Called from any other thread while a dispatch
    /// is in progress, it blocks until that dispatch has finished.
    ///
    /// # Panics
    ///
    /// A panicking subscriber unwinds through this call. The bus stays
    /// usable; actions still queued are delivered by the next publish.
    pub fn publish(&self, action: A) {
        let current = thread::current().id();
        {
            let mut inner = self.lock();
            if inner.dispatcher == Some(current) {
                inner.pending.push_back(action);
                BusMetrics::record_queued();
                return;
            }
            while inner.dispatcher.is_some() {
                inner = self
                    .inner
                    .released
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            inner.pending.push_back(action);
            inner.dispatcher = Some(current);
        }

        let _turn = DispatchTurn { bus: self };

        loop {
            let (action, handlers) = {
                let mut inner = self.lock();
                let Some(action) = inner.pending.pop_front() else {
                    return;
                };
                let handlers: SmallVec<[Handler<A>; 8]> = inner
                    .subscribers
                    .iter()
                    .filter(|s| s.filter.matches(&action))
                    .map(|s| Arc::clone(&s.handler))
                    .collect();
                (action, handlers)
            };

            let started = Instant::now();
            tracing::trace!(kind = action.kind(), subscribers = handlers.len(), "Dispatching action");
            for handler in &handlers {
                handler(&action);
            }
            BusMetrics::record_publish(started.elapsed());
        }
    }

    /// Observe every action published from now on
    ///
    /// The handler runs synchronously on the dispatching thread. Dropping
    /// the returned [`Subscription`] unsubscribes.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.subscribe_filtered(KindFilter::any(), handler)
    }

    /// Observe actions accepted by `filter` from now on
    pub fn subscribe_filtered<F>(&self, filter: KindFilter, handler: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push(Subscriber {
                id,
                filter,
                handler: Arc::new(handler),
            });
            id
        };

        let weak: Weak<BusShared<A>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|s| s.id != id);
            }
        })
    }

    /// A view of this bus restricted to the given kinds
    #[must_use]
    pub fn of_kind(&self, kinds: &[&'static str]) -> KindView<A> {
        KindView {
            bus: self.clone(),
            filter: KindFilter::new(kinds),
        }
    }

    /// A handle that publishes without keeping the bus alive
    #[must_use]
    pub fn downgrade(&self) -> WeakActionBus<A> {
        WeakActionBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner<A>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: Action> Default for ActionBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for ActionBus<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Action> fmt::Debug for ActionBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ActionBus")
            .field("subscribers", &inner.subscribers.len())
            .field("pending", &inner.pending.len())
            .field("dispatching", &inner.dispatcher.is_some())
            .finish()
    }
}

/// Hands the dispatch turn back when `publish` returns or unwinds
struct DispatchTurn<'a, A: Action> {
    bus: &'a ActionBus<A>,
}

impl<A: Action> Drop for DispatchTurn<'_, A> {
    fn drop(&mut self) {
        self.bus.lock().dispatcher = None;
        self.bus.inner.released.notify_all();
    }
}

/// Non-owning publisher handle
///
/// Held by effect subscriptions so the bus does not keep itself alive
/// through its own subscribers.
pub struct WeakActionBus<A> {
    inner: Weak<BusShared<A>>,
}

impl<A: Action> WeakActionBus<A> {
    /// Publish if the bus still exists; returns whether it did
    pub fn publish(&self, action: A) -> bool {
        match self.upgrade() {
            Some(bus) => {
                bus.publish(action);
                true
            }
            None => false,
        }
    }

    /// Recover a strong handle if the bus still exists
    #[must_use]
    pub fn upgrade(&self) -> Option<ActionBus<A>> {
        self.inner.upgrade().map(|inner| ActionBus { inner })
    }
}

impl<A> Clone for WeakActionBus<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// A bus view restricted to a set of kinds
///
/// Returned by [`ActionBus::of_kind`].
pub struct KindView<A> {
    bus: ActionBus<A>,
    filter: KindFilter,
}

impl<A: Action> KindView<A> {
    /// Observe matching actions published from now on
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.bus.subscribe_filtered(self.filter.clone(), handler)
    }

    /// The kinds this view accepts
    #[must_use]
    pub const fn filter(&self) -> &KindFilter {
        &self.filter
    }
}

/// RAII handle for a live subscription
///
/// Dropping it (or calling [`unsubscribe`](Subscription::unsubscribe))
/// removes the handler. Used by both the action bus and the state store.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop receiving notifications
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
