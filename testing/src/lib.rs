//! # Composable Effects Testing
//!
//! Testing utilities and helpers for the composable effects architecture.
//!
//! This crate provides:
//! - Mock implementations of environment traits (clock, data source)
//! - An error handler that collects effect failures for assertions
//! - An action recorder for observing a bus from async tests
//! - A Given-When-Then harness for projection handlers
//! - proptest strategies
//!
//! ## Example
//!
//! ```ignore
//! use composable_effects_testing::{ActionRecorder, ScriptedDataSource};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_load_flow() {
//!     let api = Arc::new(ScriptedDataSource::new(vec![1, 2, 3]).with_delay(Duration::from_secs(1)));
//!     let system = build_system(Arc::clone(&api));
//!     let recorder = ActionRecorder::new(system.bus());
//!
//!     system.dispatch(Action::PageOpened);
//!     recorder.wait_for_kind(Action::LOADED, Duration::from_secs(5)).await.unwrap();
//!
//!     assert_eq!(api.calls(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use composable_effects_core::environment::Clock;


/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use composable_effects_core::effect::EffectError;
    use composable_effects_core::environment::DataSource;
    use composable_effects_core::response::OperationError;
    use composable_effects_runtime::ErrorHandler;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_effects_testing::mocks::FixedClock;
    /// use composable_effects_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Data source returning a fixed list after a fixed delay
    ///
    /// Counts how many fetches were started and how many settled, so tests
    /// can assert on concurrency policies. The delay uses `tokio::time`, so
    /// it can be driven by a paused test clock.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let api = ScriptedDataSource::new(vec!["a", "b"]).with_delay(Duration::from_millis(500));
    /// api.fail_with(OperationError::failed("backend down"));
    /// ```
    #[derive(Debug)]
    pub struct ScriptedDataSource<T> {
        items: Vec<T>,
        delay: Duration,
        failure: Mutex<Option<OperationError>>,
        calls: AtomicUsize,
        settled: AtomicUsize,
    }

    impl<T: Clone + Send + Sync> ScriptedDataSource<T> {
        /// Succeed immediately with `items`
        #[must_use]
        pub const fn new(items: Vec<T>) -> Self {
            Self {
                items,
                delay: Duration::ZERO,
                failure: Mutex::new(None),
                calls: AtomicUsize::new(0),
                settled: AtomicUsize::new(0),
            }
        }

        /// Settle every fetch after `delay`
        #[must_use]
        pub const fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Make subsequent fetches fail with `error`
        pub fn fail_with(&self, error: OperationError) {
            *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        }

        /// Make subsequent fetches succeed again
        pub fn succeed(&self) {
            *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }

        /// Number of fetches started
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Number of fetches that ran to completion
        #[must_use]
        pub fn settled(&self) -> usize {
            self.settled.load(Ordering::SeqCst)
        }
    }

    impl<T: Clone + Send + Sync> DataSource<T> for ScriptedDataSource<T> {
        fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<T>, OperationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failure = self
                .failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            Box::pin(async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.settled.fetch_add(1, Ordering::SeqCst);
                match failure {
                    Some(error) => Err(error),
                    None => Ok(self.items.clone()),
                }
            })
        }
    }

    /// Error handler that keeps every reported failure
    ///
    /// Clones share the same collection.
    #[derive(Debug, Clone, Default)]
    pub struct CollectingErrorHandler {
        failures: Arc<Mutex<Vec<(String, EffectError)>>>,
    }

    impl CollectingErrorHandler {
        /// Create an empty collector
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Every `(effect_id, error)` reported so far
        #[must_use]
        pub fn failures(&self) -> Vec<(String, EffectError)> {
            self.failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Ids of the effects that failed, in report order
        #[must_use]
        pub fn effect_ids(&self) -> Vec<String> {
            self.failures().into_iter().map(|(id, _)| id).collect()
        }

        /// Whether nothing was reported
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
        }
    }

    impl ErrorHandler for CollectingErrorHandler {
        fn handle(&self, effect_id: &str, error: &EffectError) {
            self.failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((effect_id.to_string(), error.clone()));
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use composable_effects_core::action::Action;
    use composable_effects_runtime::{ActionBus, Subscription};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records every action published on a bus
    ///
    /// Subscribe it before publishing; it sees actions from then on.
    pub struct ActionRecorder<A> {
        actions: Arc<Mutex<Vec<A>>>,
        notify: Arc<Notify>,
        _subscription: Subscription,
    }

    impl<A: Action> ActionRecorder<A> {
        /// Start recording `bus`
        #[must_use]
        pub fn new(bus: &ActionBus<A>) -> Self {
            let actions = Arc::new(Mutex::new(Vec::new()));
            let notify = Arc::new(Notify::new());

            let sink = Arc::clone(&actions);
            let waker = Arc::clone(&notify);
            let subscription = bus.subscribe(move |action: &A| {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(action.clone());
                waker.notify_waiters();
            });

            Self {
                actions,
                notify,
                _subscription: subscription,
            }
        }

        /// Every recorded action, in delivery order
        #[must_use]
        pub fn actions(&self) -> Vec<A> {
            self.actions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Kinds of every recorded action, in delivery order
        #[must_use]
        pub fn kinds(&self) -> Vec<&'static str> {
            self.actions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(Action::kind)
                .collect()
        }

        /// Number of recorded actions of the given kind
        #[must_use]
        pub fn count_of(&self, kind: &str) -> usize {
            self.actions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|a| a.kind() == kind)
                .count()
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            self.actions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        /// Wait until a recorded action matches `predicate`
        ///
        /// Returns the first match, or `None` if `timeout` elapses first.
        pub async fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Option<A>
        where
            P: Fn(&A) -> bool,
        {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let notified = self.notify.notified();
                let found = self
                    .actions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .find(|a| predicate(a))
                    .cloned();
                if found.is_some() {
                    return found;
                }
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return None;
                }
            }
        }

        /// Wait until an action of `kind` has been recorded
        pub async fn wait_for_kind(&self, kind: &str, timeout: Duration) -> Option<A> {
            self.wait_for(|a| a.kind() == kind, timeout).await
        }
    }

    /// Install a `tracing` subscriber that writes through the test harness
    ///
    /// Honours `RUST_LOG`. Safe to call from every test; only the first
    /// call installs anything.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Search queries: short, mixed case, sometimes empty
    pub fn search_query() -> impl Strategy<Value = String> {
        "[a-zA-Z. ]{0,8}"
    }

    /// Sequences of kinds drawn from `kinds`
    pub fn kind_sequence(
        kinds: &'static [&'static str],
        max_len: usize,
    ) -> impl Strategy<Value = Vec<&'static str>> {
        prop::collection::vec(prop::sample::select(kinds), 0..max_len)
    }
}

// Re-export commonly used items
pub use helpers::{ActionRecorder, init_test_tracing};
pub use mocks::{CollectingErrorHandler, FixedClock, ScriptedDataSource, test_clock};
pub use projection_test::ProjectionTest;
