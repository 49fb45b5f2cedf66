//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for every runtime component:
//! - Action bus publishing and dispatch latency
//! - Effect outputs, failures and dropped triggers
//! - State store updates
//! - Runner lifecycle transitions
//!
//! Recording is always on; without an installed recorder the `metrics`
//! macros are no-ops. Install one with [`MetricsServer::start`].
//!
//! # Example
//!
//! ```ignore
//! use composable_effects_runtime::metrics::MetricsServer;
//!
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! // ... run the application ...
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder with on-demand rendering.
///
/// The runtime has no network surface; the rendered text can be printed,
/// logged or served by the embedding application.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a server that has not installed its recorder yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the histogram buckets are rejected
    /// and [`MetricsError::Install`] if the recorder cannot be installed.
    ///
    /// # Note
    ///
    /// Only one global recorder can exist per process. If one is already
    /// installed (e.g., by another test), this succeeds without a handle and
    /// [`render`](Self::render) returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Action Bus Metrics
    describe_counter!(
        "action_bus_published_total",
        "Total number of actions delivered by the action bus"
    );
    describe_counter!(
        "action_bus_queued_total",
        "Total number of actions queued by a nested publish"
    );
    describe_histogram!(
        "action_bus_dispatch_duration_seconds",
        "Time taken to deliver one action to every subscriber"
    );

    // Effect Metrics
    describe_counter!(
        "effects_dispatched_total",
        "Total number of actions republished by dispatching effects"
    );
    describe_counter!(
        "effects_failed_total",
        "Total number of effects terminated by a failure"
    );
    describe_counter!(
        "effects_triggers_dropped_total",
        "Total number of triggers an effect ignored (exhaust policy or full buffer)"
    );

    // State Store Metrics
    describe_counter!(
        "state_store_updates_total",
        "Total number of snapshots applied to the state store"
    );
    describe_histogram!(
        "state_store_update_duration_seconds",
        "Time taken to compute a snapshot and notify subscribers"
    );

    // Runner Metrics
    describe_counter!("runner_starts_total", "Total number of runner starts");
    describe_counter!("runner_stops_total", "Total number of runner stops");
}

/// Action bus metrics recorder.
pub struct BusMetrics;

impl BusMetrics {
    /// Record one action delivered to every subscriber.
    pub fn record_publish(duration: Duration) {
        counter!("action_bus_published_total").increment(1);
        histogram!("action_bus_dispatch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish that was queued behind an in-progress dispatch.
    pub fn record_queued() {
        counter!("action_bus_queued_total").increment(1);
    }
}

/// Effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an action republished by an effect.
    pub fn record_dispatch(effect_id: &str) {
        counter!("effects_dispatched_total", "effect" => effect_id.to_string()).increment(1);
    }

    /// Record an effect terminated by a failure.
    pub fn record_failure(effect_id: &str) {
        counter!("effects_failed_total", "effect" => effect_id.to_string()).increment(1);
    }

    /// Record a trigger the effect did not act on.
    pub fn record_dropped(effect_id: &str, reason: &'static str) {
        counter!(
            "effects_triggers_dropped_total",
            "effect" => effect_id.to_string(),
            "reason" => reason
        )
        .increment(1);
    }
}

/// State store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record one applied snapshot.
    pub fn record_update(duration: Duration) {
        counter!("state_store_updates_total").increment(1);
        histogram!("state_store_update_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Runner lifecycle metrics recorder.
pub struct RunnerMetrics;

impl RunnerMetrics {
    /// Record an `Idle → Running` transition.
    pub fn record_start() {
        counter!("runner_starts_total").increment(1);
    }

    /// Record a `Running → Idle` transition.
    pub fn record_stop() {
        counter!("runner_stops_total").increment(1);
    }
}
