//! The effects runner.
//!
//! Owns the registered effects and activates them against an [`ActionBus`].
//!
//! # Lifecycle
//!
//! ```text
//!            start()                stop()
//!   Idle ───────────────▶ Running ───────────────▶ Idle
//!    ▲ register_effects()    │ register_effects() → InvalidLifecycleState
//!    └───────────────────────┘
//! ```
//!
//! `start` and `stop` are idempotent. Stopping cancels every live
//! subscription and in-flight operation but keeps the registered set, so the
//! same effects can be started again. The state store is never touched.
//!
//! # Execution
//!
//! - Synchronous stages run inline while the bus delivers the action, so a
//!   state projection has been applied by the time `publish` returns.
//! - Each asynchronous stage gets a bounded channel and one worker task. The
//!   bus handler forwards matching triggers into the channel; the worker owns
//!   a `JoinSet` of in-flight operations and enforces the stage's
//!   [`Concurrency`] policy. For [`Concurrency::Exhaust`] the handler drops a
//!   trigger outright while an operation is in flight.
//!
//! # Failure isolation
//!
//! An effect that returns an [`EffectError`] or panics is terminated: it stops
//! reacting for the rest of this activation, the failure is recorded in the
//! [`FailureLog`] and handed to the configured error handler. Other effects
//! keep running. A terminated effect is only revived by `stop` + `start`.

use crate::bus::{ActionBus, Subscription, WeakActionBus};
use crate::error::{RunnerError, RunnerState};
use crate::metrics::{EffectMetrics, RunnerMetrics};
use crate::{ErrorHandler, FailureLog, FailureRecord, HealthCheck, RunnerConfig};
use composable_effects_core::action::Action;
use composable_effects_core::effect::{AsyncProject, Concurrency, Effect, EffectError, Stage};
use composable_effects_core::environment::Clock;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Runs registered effects against an action bus
///
/// # Example
///
/// ```ignore
/// let bus = ActionBus::new();
/// let runner = EffectsRunner::new(bus.clone());
///
/// runner.register_effects(vec![load_effect, update_state_effect])?;
/// runner.start()?;
///
/// bus.publish(SearchAction::PageOpened);
///
/// runner.stop();
/// ```
pub struct EffectsRunner<A: Action> {
    bus: ActionBus<A>,
    config: RunnerConfig,
    failures: FailureLog,
    inner: Mutex<RunnerInner<A>>,
}

struct RunnerInner<A> {
    effects: Vec<Effect<A>>,
    running: bool,
    active: Vec<ActiveEffect>,
}

impl<A: Action> EffectsRunner<A> {
    /// Create an idle runner with the default configuration
    #[must_use]
    pub fn new(bus: ActionBus<A>) -> Self {
        Self::with_config(bus, RunnerConfig::default())
    }

    /// Create an idle runner with a custom configuration
    #[must_use]
    pub fn with_config(bus: ActionBus<A>, config: RunnerConfig) -> Self {
        Self {
            failures: FailureLog::new(config.failure_log_size),
            bus,
            config,
            inner: Mutex::new(RunnerInner {
                effects: Vec::new(),
                running: false,
                active: Vec::new(),
            }),
        }
    }

    /// Replace the registered effects
    ///
    /// # Errors
    ///
    /// - [`RunnerError::InvalidLifecycleState`] if the runner is running
    /// - [`RunnerError::DuplicateEffectId`] if two effects share an id
    ///
    /// On error the previously registered set is left unchanged.
    #[tracing::instrument(skip_all, name = "runner_register")]
    pub fn register_effects(
        &self,
        effects: impl IntoIterator<Item = Effect<A>>,
    ) -> Result<(), RunnerError> {
        let effects: Vec<Effect<A>> = effects.into_iter().collect();
        let mut inner = self.lock();

        if inner.running {
            tracing::warn!("Attempted to register effects while running");
            return Err(RunnerError::InvalidLifecycleState {
                operation: "register effects",
                state: RunnerState::Running,
            });
        }

        let mut seen = HashSet::with_capacity(effects.len());
        if let Some(duplicate) = effects.iter().find(|e| !seen.insert(e.id())) {
            return Err(RunnerError::DuplicateEffectId(duplicate.id().to_string()));
        }

        tracing::debug!(count = effects.len(), "Effects registered");
        inner.effects = effects;
        Ok(())
    }

    /// Activate every registered effect
    ///
    /// Calling `start` while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::RuntimeUnavailable`] if an asynchronous effect
    /// is registered and this is not called from within a Tokio runtime. The
    /// runner stays idle.
    #[tracing::instrument(skip(self), name = "runner_start")]
    pub fn start(&self) -> Result<(), RunnerError> {
        let mut inner = self.lock();
        if inner.running {
            tracing::debug!("Runner already running");
            return Ok(());
        }

        let runtime = if inner.effects.iter().any(|e| e.pipeline().is_async()) {
            Some(Handle::try_current().map_err(|_| RunnerError::RuntimeUnavailable)?)
        } else {
            None
        };

        let mut active = Vec::with_capacity(inner.effects.len());
        for effect in &inner.effects {
            active.push(self.activate(effect, runtime.as_ref())?);
        }

        inner.active = active;
        inner.running = true;

        RunnerMetrics::record_start();
        tracing::info!(effects = inner.effects.len(), "Effects runner started");
        Ok(())
    }

    /// Deactivate every effect
    ///
    /// Cancels bus subscriptions and in-flight operations. Results of
    /// operations that settle afterwards are discarded. Calling `stop` while
    /// idle is a no-op.
    #[tracing::instrument(skip(self), name = "runner_stop")]
    pub fn stop(&self) {
        let active = {
            let mut inner = self.lock();
            if !inner.running {
                tracing::debug!("Runner already idle");
                return;
            }
            inner.running = false;
            std::mem::take(&mut inner.active)
        };

        let count = active.len();
        drop(active);

        RunnerMetrics::record_stop();
        tracing::info!(effects = count, "Effects runner stopped");
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RunnerState {
        if self.lock().running {
            RunnerState::Running
        } else {
            RunnerState::Idle
        }
    }

    /// Whether the runner is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Ids of the registered effects, in registration order
    #[must_use]
    pub fn effect_ids(&self) -> Vec<String> {
        self.lock().effects.iter().map(|e| e.id().to_string()).collect()
    }

    /// Ids of effects terminated by a failure in the current activation
    #[must_use]
    pub fn failed_effects(&self) -> Vec<String> {
        self.lock()
            .active
            .iter()
            .filter(|a| a.slot.has_failed())
            .map(|a| a.slot.id.clone())
            .collect()
    }

    /// The log of effect failures
    ///
    /// Survives `stop`/`start` cycles.
    #[must_use]
    pub fn failures(&self) -> FailureLog {
        self.failures.clone()
    }

    /// The bus this runner is attached to
    #[must_use]
    pub const fn bus(&self) -> &ActionBus<A> {
        &self.bus
    }

    /// The runner configuration
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Perform a health check on the runner
    ///
    /// - Healthy: idle, or running with no terminated effects
    /// - Degraded: some effects were terminated by a failure
    /// - Unhealthy: every effect was terminated by a failure
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        let inner = self.lock();
        let total = inner.active.len();
        let failed = inner.active.iter().filter(|a| a.slot.has_failed()).count();

        let check = if !inner.running || failed == 0 {
            HealthCheck::healthy("effects_runner")
        } else if failed == total {
            HealthCheck::unhealthy("effects_runner", "Every effect was terminated by a failure")
        } else {
            HealthCheck::degraded(
                "effects_runner",
                format!("{failed} of {total} effects terminated by a failure"),
            )
        };

        let state = if inner.running {
            RunnerState::Running
        } else {
            RunnerState::Idle
        };

        check
            .with_metadata("state", state.to_string())
            .with_metadata("registered", inner.effects.len().to_string())
            .with_metadata("failed", failed.to_string())
            .with_metadata("failures_logged", self.failures.len().to_string())
    }

    fn activate(&self, effect: &Effect<A>, runtime: Option<&Handle>) -> Result<ActiveEffect, RunnerError> {
        let slot = Arc::new(EffectSlot {
            id: effect.id().to_string(),
            alive: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            log: self.failures.clone(),
            error_handler: Arc::clone(&self.config.error_handler),
            clock: Arc::clone(&self.config.clock),
        });
        let publisher = effect.dispatches().then(|| self.bus.downgrade());
        let pipeline = effect.pipeline().clone();
        let filter = pipeline.filter().clone();
        let stage = pipeline.stage().clone();

        match stage {
            Stage::Map(project) => {
                let handler_slot = Arc::clone(&slot);
                let subscription = self.bus.subscribe_filtered(filter, move |action: &A| {
                    if !handler_slot.is_alive() || !pipeline.accepts(action) {
                        return;
                    }
                    match catch_unwind(AssertUnwindSafe(|| project(action))) {
                        Ok(Ok(Some(output))) => handler_slot.emit(output, publisher.as_ref()),
                        Ok(Ok(None)) => {}
                        Ok(Err(error)) => handler_slot.terminate(error, Some(action.kind())),
                        Err(payload) => handler_slot.terminate(
                            EffectError::Panicked(panic_message(payload.as_ref())),
                            Some(action.kind()),
                        ),
                    }
                });

                tracing::debug!(effect = %slot.id, "Activated synchronous effect");
                Ok(ActiveEffect {
                    slot,
                    worker: None,
                    _subscription: subscription,
                })
            }
            Stage::Flatten { policy, project } => {
                let runtime = runtime.ok_or(RunnerError::RuntimeUnavailable)?;
                let (tx, rx) = mpsc::channel::<A>(self.config.effect_buffer.max(1));
                let in_flight = Arc::new(AtomicBool::new(false));

                let handler_slot = Arc::clone(&slot);
                let handler_in_flight = Arc::clone(&in_flight);
                let subscription = self.bus.subscribe_filtered(filter, move |action: &A| {
                    if !handler_slot.is_alive() || !pipeline.accepts(action) {
                        return;
                    }
                    if policy == Concurrency::Exhaust && handler_in_flight.swap(true, Ordering::AcqRel) {
                        tracing::debug!(
                            effect = %handler_slot.id,
                            kind = action.kind(),
                            "Operation in flight, trigger ignored"
                        );
                        EffectMetrics::record_dropped(&handler_slot.id, "exhaust");
                        return;
                    }
                    if let Err(error) = tx.try_send(action.clone()) {
                        if policy == Concurrency::Exhaust {
                            handler_in_flight.store(false, Ordering::Release);
                        }
                        if let TrySendError::Full(_) = error {
                            tracing::warn!(
                                effect = %handler_slot.id,
                                kind = action.kind(),
                                "Effect buffer full, trigger dropped"
                            );
                            EffectMetrics::record_dropped(&handler_slot.id, "buffer_full");
                        }
                    }
                });

                let worker = runtime.spawn(run_worker(
                    rx,
                    Worker {
                        slot: Arc::clone(&slot),
                        policy,
                        project,
                        publisher,
                        in_flight,
                    },
                ));

                tracing::debug!(effect = %slot.id, %policy, "Activated asynchronous effect");
                Ok(ActiveEffect {
                    slot,
                    worker: Some(worker),
                    _subscription: subscription,
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunnerInner<A>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: Action> Drop for EffectsRunner<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<A: Action> fmt::Debug for EffectsRunner<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("EffectsRunner")
            .field("running", &inner.running)
            .field("effects", &inner.effects.len())
            .field("active", &inner.active.len())
            .field("failures", &self.failures.len())
            .finish()
    }
}

/// One effect's activation: its bus subscription and, for asynchronous
/// stages, its worker task
struct ActiveEffect {
    slot: Arc<EffectSlot>,
    worker: Option<JoinHandle<()>>,
    _subscription: Subscription,
}

impl Drop for ActiveEffect {
    fn drop(&mut self) {
        self.slot.alive.store(false, Ordering::Release);
        if let Some(worker) = &self.worker {
            worker.abort();
        }
    }
}

/// Per-activation state shared by an effect's bus handler and worker
struct EffectSlot {
    id: String,
    alive: AtomicBool,
    failed: AtomicBool,
    log: FailureLog,
    error_handler: Arc<dyn ErrorHandler>,
    clock: Arc<dyn Clock>,
}

impl EffectSlot {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn emit<A: Action>(&self, output: A, publisher: Option<&WeakActionBus<A>>) {
        if !self.is_alive() {
            tracing::debug!(effect = %self.id, kind = output.kind(), "Late output discarded");
            return;
        }
        if let Some(publisher) = publisher {
            tracing::debug!(effect = %self.id, kind = output.kind(), "Effect dispatching action");
            EffectMetrics::record_dispatch(&self.id);
            publisher.publish(output);
        }
    }

    fn terminate(&self, error: EffectError, trigger_kind: Option<&'static str>) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        self.failed.store(true, Ordering::Release);
        EffectMetrics::record_failure(&self.id);

        self.log.push(FailureRecord {
            effect_id: self.id.clone(),
            trigger_kind,
            error: error.clone(),
            occurred_at: self.clock.now(),
        });
        self.error_handler.handle(&self.id, &error);
    }
}

struct Worker<A> {
    slot: Arc<EffectSlot>,
    policy: Concurrency,
    project: AsyncProject<A>,
    publisher: Option<WeakActionBus<A>>,
    in_flight: Arc<AtomicBool>,
}

/// Drive one asynchronous effect until its trigger channel closes or it fails
async fn run_worker<A: Action>(mut triggers: mpsc::Receiver<A>, worker: Worker<A>) {
    let mut operations: JoinSet<(u64, Option<A>)> = JoinSet::new();
    let mut generation: u64 = 0;

    loop {
        let accepting = worker.policy != Concurrency::Concat || operations.is_empty();

        tokio::select! {
            trigger = triggers.recv(), if accepting => {
                let Some(trigger) = trigger else { break };

                let operation = match catch_unwind(AssertUnwindSafe(|| (worker.project)(&trigger))) {
                    Ok(operation) => operation,
                    Err(payload) => {
                        worker.slot.terminate(
                            EffectError::Panicked(panic_message(payload.as_ref())),
                            Some(trigger.kind()),
                        );
                        return;
                    }
                };

                if worker.policy == Concurrency::Switch && !operations.is_empty() {
                    tracing::debug!(effect = %worker.slot.id, "Cancelling in-flight operation");
                    operations.abort_all();
                }

                generation += 1;
                let tag = generation;
                operations.spawn(async move { (tag, operation.await) });
            }
            Some(joined) = operations.join_next() => {
                // Settled: the next trigger is accepted, including one
                // published while this result is being delivered.
                if worker.policy == Concurrency::Exhaust {
                    worker.in_flight.store(false, Ordering::Release);
                }
                match joined {
                    Ok((tag, output)) => {
                        let superseded = worker.policy == Concurrency::Switch && tag != generation;
                        if let Some(output) = output.filter(|_| !superseded) {
                            worker.slot.emit(output, worker.publisher.as_ref());
                        }
                    }
                    Err(error) if error.is_cancelled() => {}
                    Err(error) => {
                        worker.slot.terminate(EffectError::Panicked(join_error_message(error)), None);
                        return;
                    }
                }
            }
            else => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn join_error_message(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic().as_ref())
    } else {
        error.to_string()
    }
}
