//! # Composable Effects Runtime
//!
//! Runtime implementation for the composable effects architecture.
//!
//! This crate executes the effect descriptions from
//! `composable_effects_core`: it carries actions, runs effects against them
//! and holds the resulting state.
//!
//! ## Core Components
//!
//! - **Action Bus**: Synchronous multicast channel with trampolined re-entrant publishing
//! - **Effects Runner**: Effect lifecycle, concurrency policies and per-effect failure isolation
//! - **State Store**: Immutable snapshots, replaced only through `apply`
//! - **Effects System**: Context object wiring one bus, one store and one runner together
//!
//! ## Data Flow
//!
//! ```text
//! publish(action) ─▶ ActionBus ─▶ every matching effect
//!                       ▲               │
//!                       │ dispatching   │ non-dispatching
//!                       └───────────────┤
//!                                       ▼
//!                               StateStore::apply ─▶ snapshot subscribers
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use composable_effects_runtime::{EffectsSystem, project_into};
//!
//! let system = EffectsSystem::new(SearchState::default());
//! system.runner().register_effects(vec![
//!     load_effect(api),
//!     project_into(system.store(), EffectConfig::new("update-results"), &[SearchAction::LOADED], reduce_loaded),
//! ])?;
//! system.runner().start()?;
//!
//! system.dispatch(SearchAction::PageOpened);
//! ```

use chrono::{DateTime, Utc};
use composable_effects_core::effect::EffectError;
use composable_effects_core::environment::{Clock, SystemClock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// The action bus
pub mod bus;

/// The state store
pub mod store;

/// The effects runner
pub mod runner;

/// Bus, store and runner bundled into one context object
pub mod system;

/// Effects that project actions into the state store
pub mod projection;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the runtime
pub mod error {
    use std::fmt;
    use thiserror::Error;

    /// Lifecycle state of an effects runner
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum RunnerState {
        /// Effects are registered but not reacting
        Idle,

        /// Effects are subscribed to the bus
        Running,
    }

    impl fmt::Display for RunnerState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Idle => write!(f, "idle"),
                Self::Running => write!(f, "running"),
            }
        }
    }

    /// Errors returned by runner operations
    ///
    /// These are raised synchronously to the caller of the misused
    /// operation and never leave the runner in a partially updated state.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RunnerError {
        /// The operation is not legal in the runner's current state
        ///
        /// Registering effects is only legal while idle.
        #[error("Cannot {operation} while the runner is {state}")]
        InvalidLifecycleState {
            /// What the caller attempted
            operation: &'static str,
            /// The state the runner was in
            state: RunnerState,
        },

        /// Two effects in one registration share an id
        #[error("Duplicate effect id: {0}")]
        DuplicateEffectId(String),

        /// Asynchronous effects were registered outside a Tokio runtime
        #[error("Asynchronous effects require a Tokio runtime, but none is available")]
        RuntimeUnavailable,
    }
}

pub use bus::{ActionBus, KindView, Subscription, WeakActionBus};
pub use error::{RunnerError, RunnerState};
pub use projection::project_into;
pub use runner::EffectsRunner;
pub use store::StateStore;
pub use system::EffectsSystem;

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but some effects were terminated
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,

    /// Metadata such as effect and failure counts
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Look up a metadata value by key
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Receives failures of effects terminated by the runner
///
/// Implemented for any `Fn(&str, &EffectError) + Send + Sync`.
pub trait ErrorHandler: Send + Sync {
    /// Handle the failure of the effect with id `effect_id`
    fn handle(&self, effect_id: &str, error: &EffectError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&str, &EffectError) + Send + Sync,
{
    fn handle(&self, effect_id: &str, error: &EffectError) {
        self(effect_id, error);
    }
}

/// Default error handler: one `error!` event keyed by effect id
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, effect_id: &str, error: &EffectError) {
        tracing::error!(effect = effect_id, error = %error, "Effect terminated by failure");
    }
}

/// Failure log entry
///
/// Describes one effect terminated by a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Id of the failed effect
    pub effect_id: String,

    /// Kind of the action being handled, when known
    pub trigger_kind: Option<&'static str>,

    /// What went wrong
    pub error: EffectError,

    /// When the failure was recorded, from the runner's clock
    pub occurred_at: DateTime<Utc>,
}

/// Bounded log of effect failures
///
/// # Features
///
/// - Bounded with configurable max size
/// - FIFO ordering (oldest entries dropped when full)
/// - Thread-safe; clones share the same log
///
/// # Example
///
/// ```ignore
/// let failures = runner.failures();
/// for record in failures.entries() {
///     println!("{} failed at {}: {}", record.effect_id, record.occurred_at, record.error);
/// }
/// ```
#[derive(Debug)]
pub struct FailureLog {
    entries: Arc<Mutex<VecDeque<FailureRecord>>>,
    max_size: usize,
}

impl FailureLog {
    /// Create an empty log holding at most `max_size` records
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            max_size,
        }
    }

    /// Append a record, dropping the oldest one if the log is full
    pub fn push(&self, record: FailureRecord) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.max_size == 0 {
            return;
        }
        if entries.len() >= self.max_size {
            entries.pop_front();
            tracing::warn!(max_size = self.max_size, "Failure log at capacity, dropping oldest entry");
        }
        entries.push_back(record);
    }

    /// Get the current number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every record, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<FailureRecord> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The most recent record
    #[must_use]
    pub fn latest(&self) -> Option<FailureRecord> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Remove and return every record, oldest first
    pub fn drain(&self) -> Vec<FailureRecord> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.drain(..).collect()
    }

    /// Get the maximum log size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Clone for FailureLog {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            max_size: self.max_size,
        }
    }
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Configuration for effects runners
///
/// # Example
///
/// ```ignore
/// let config = RunnerConfig::default()
///     .with_effect_buffer(16)
///     .with_failure_log_size(20)
///     .with_error_handler(|effect_id: &str, error: &EffectError| {
///         eprintln!("{effect_id}: {error}");
///     });
///
/// let runner = EffectsRunner::with_config(bus, config);
/// ```
#[derive(Clone)]
pub struct RunnerConfig {
    /// Capacity of each asynchronous effect's trigger channel
    pub effect_buffer: usize,
    /// Maximum number of records kept in the failure log
    pub failure_log_size: usize,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RunnerConfig {
    /// Set the trigger channel capacity of asynchronous effects
    ///
    /// Triggers arriving while the channel is full are dropped with a warning.
    #[must_use]
    pub const fn with_effect_buffer(mut self, capacity: usize) -> Self {
        self.effect_buffer = capacity;
        self
    }

    /// Set the failure log size
    #[must_use]
    pub const fn with_failure_log_size(mut self, max_size: usize) -> Self {
        self.failure_log_size = max_size;
        self
    }

    /// Set the handler that receives effect failures
    #[must_use]
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Set the clock used to timestamp failures
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The configured error handler
    #[must_use]
    pub fn error_handler(&self) -> &dyn ErrorHandler {
        self.error_handler.as_ref()
    }

    /// The configured clock
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            effect_buffer: 64,
            failure_log_size: 100,
            error_handler: Arc::new(LogErrorHandler),
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("effect_buffer", &self.effect_buffer)
            .field("failure_log_size", &self.failure_log_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(effect_id: &str) -> FailureRecord {
        FailureRecord {
            effect_id: effect_id.to_string(),
            trigger_kind: None,
            error: EffectError::failed("boom"),
            occurred_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }

    #[test]
    fn test_health_status_worst() {
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Degraded), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Unhealthy.worst(HealthStatus::Healthy), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Healthy), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_check_metadata() {
        let check = HealthCheck::degraded("effects_runner", "1 of 2 effects terminated")
            .with_metadata("failed", "1");
        assert!(check.status.is_degraded());
        assert_eq!(check.metadata_value("failed"), Some("1"));
        assert_eq!(check.metadata_value("missing"), None);
    }

    #[test]
    fn test_failure_log_drops_oldest_when_full() {
        let log = FailureLog::new(2);
        log.push(record("a"));
        log.push(record("b"));
        log.push(record("c"));

        let ids: Vec<_> = log.entries().into_iter().map(|r| r.effect_id).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(log.latest().map(|r| r.effect_id), Some("c".to_string()));
    }

    #[test]
    fn test_failure_log_clones_share_entries() {
        let log = FailureLog::default();
        let view = log.clone();
        log.push(record("a"));
        assert_eq!(view.len(), 1);

        assert_eq!(view.drain().len(), 1);
        assert!(log.is_empty());
        assert_eq!(log.max_size(), 100);
    }

    #[test]
    fn test_zero_sized_log_keeps_nothing() {
        let log = FailureLog::new(0);
        log.push(record("a"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_runner_config_builder() {
        let config = RunnerConfig::default()
            .with_effect_buffer(8)
            .with_failure_log_size(5);
        assert_eq!(config.effect_buffer, 8);
        assert_eq!(config.failure_log_size, 5);
    }

    #[test]
    fn test_closure_error_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = RunnerConfig::default().with_error_handler(move |id: &str, _: &EffectError| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(id.to_string());
        });

        config.error_handler().handle("load", &EffectError::failed("x"));
        assert_eq!(
            *seen.lock().unwrap_or_else(PoisonError::into_inner),
            vec!["load".to_string()]
        );
    }
}
