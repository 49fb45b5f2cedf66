//! Effect descriptions.
//!
//! An [`Effect`] is a named unit of reactive logic: given the stream of
//! actions published on the bus, it derives follow-up actions (a
//! *dispatching* effect) or performs a terminal side effect such as a state
//! update (a *non-dispatching* effect).
//!
//! Effects are descriptions, not execution. [`Effect::create`] runs the
//! factory exactly once and keeps the resulting [`Pipeline`]; the runner in
//! the runtime crate activates and deactivates that pipeline as it starts and
//! stops, without ever calling the factory again.
//!
//! # Pipelines
//!
//! A pipeline is a filter followed by exactly one stage:
//!
//! | Builder | Stage | Behaviour when triggered while busy |
//! |---|---|---|
//! | [`Actions::map`] / [`Actions::tap`] | synchronous | n/a, runs inline during delivery |
//! | [`Actions::exhaust_map`] | asynchronous | trigger is dropped |
//! | [`Actions::concat_map`] | asynchronous | trigger is queued |
//! | [`Actions::switch_map`] | asynchronous | in-flight operation is cancelled |
//! | [`Actions::merge_map`] | asynchronous | operations run concurrently |
//!
//! # Example
//!
//! ```ignore
//! let logging = Effect::create(EffectConfig::new("logging").non_dispatching(), |actions| {
//!     actions.tap(|action| tracing::info!(kind = action.kind(), "action"))
//! });
//! ```

use crate::action::{Action, KindFilter};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by effect logic
///
/// These are bugs in an effect, not expected operation failures (those are
/// translated into actions with [`map_response`](crate::response::map_response)).
/// The runner isolates them per effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// The effect returned an error from its synchronous stage
    #[error("Effect failed: {0}")]
    Failed(String),

    /// The effect panicked while handling an action
    #[error("Effect panicked: {0}")]
    Panicked(String),
}

impl EffectError {
    /// Shorthand for [`EffectError::Failed`]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Synchronous projection: runs inline while the bus delivers the action
pub type SyncProject<A> = Arc<dyn Fn(&A) -> Result<Option<A>, EffectError> + Send + Sync>;

/// Asynchronous projection: starts an operation that settles into at most one action
pub type AsyncProject<A> = Arc<dyn Fn(&A) -> BoxFuture<'static, Option<A>> + Send + Sync>;

type Predicate<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// How an asynchronous stage treats triggers that arrive while an operation is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concurrency {
    /// Ignore new triggers until the in-flight operation settles
    Exhaust,

    /// Queue new triggers and run them one after another
    Concat,

    /// Cancel the in-flight operation and start the new one
    Switch,

    /// Run every operation concurrently
    Merge,
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhaust => write!(f, "exhaust"),
            Self::Concat => write!(f, "concat"),
            Self::Switch => write!(f, "switch"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// The work a pipeline does with an action that passed its filter
pub enum Stage<A> {
    /// Synchronous mapping, may emit one follow-up action
    Map(SyncProject<A>),

    /// Asynchronous operation flattened under a concurrency policy
    Flatten {
        /// What to do with triggers that arrive while busy
        policy: Concurrency,
        /// Starts the operation for one trigger
        project: AsyncProject<A>,
    },
}

impl<A> Clone for Stage<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Map(project) => Self::Map(Arc::clone(project)),
            Self::Flatten { policy, project } => Self::Flatten {
                policy: *policy,
                project: Arc::clone(project),
            },
        }
    }
}

impl<A> fmt::Debug for Stage<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(_) => write!(f, "Stage::Map(<fn>)"),
            Self::Flatten { policy, .. } => f
                .debug_struct("Stage::Flatten")
                .field("policy", policy)
                .finish_non_exhaustive(),
        }
    }
}

/// The action stream handed to an effect factory
///
/// Narrow it with [`of_kind`](Actions::of_kind) and [`filter`](Actions::filter),
/// then finish it with one stage to obtain a [`Pipeline`].
pub struct Actions<A> {
    filter: KindFilter,
    predicate: Option<Predicate<A>>,
}

impl<A: Action> Default for Actions<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Action> Actions<A> {
    /// The unfiltered stream of every published action
    #[must_use]
    pub const fn new() -> Self {
        Self {
            filter: KindFilter::any(),
            predicate: None,
        }
    }

    /// Keep only actions whose kind is in `kinds`
    #[must_use]
    pub fn of_kind(mut self, kinds: &[&'static str]) -> Self {
        self.filter = KindFilter::new(kinds);
        self
    }

    /// Keep only actions for which `predicate` returns `true`
    ///
    /// Combines with any previous predicate and with the kind filter.
    #[must_use]
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let combined: Predicate<A> = match self.predicate.take() {
            Some(previous) => Arc::new(move |action: &A| previous(action) && predicate(action)),
            None => Arc::new(predicate),
        };
        self.predicate = Some(combined);
        self
    }

    /// Synchronously map each action to an optional follow-up action
    pub fn map<F>(self, project: F) -> Pipeline<A>
    where
        F: Fn(&A) -> Result<Option<A>, EffectError> + Send + Sync + 'static,
    {
        self.finish(Stage::Map(Arc::new(project)))
    }

    /// Run a side effect for each action and emit nothing
    pub fn tap<F>(self, effect: F) -> Pipeline<A>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.map(move |action| {
            effect(action);
            Ok(None)
        })
    }

    /// Start an operation per trigger, ignoring triggers while one is in flight
    pub fn exhaust_map<F, Fut>(self, project: F) -> Pipeline<A>
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<A>> + Send + 'static,
    {
        self.flatten_map(Concurrency::Exhaust, project)
    }

    /// Start an operation per trigger, queueing triggers while one is in flight
    pub fn concat_map<F, Fut>(self, project: F) -> Pipeline<A>
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<A>> + Send + 'static,
    {
        self.flatten_map(Concurrency::Concat, project)
    }

    /// Start an operation per trigger, cancelling the one in flight
    pub fn switch_map<F, Fut>(self, project: F) -> Pipeline<A>
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<A>> + Send + 'static,
    {
        self.flatten_map(Concurrency::Switch, project)
    }

    /// Start an operation per trigger, running all of them concurrently
    pub fn merge_map<F, Fut>(self, project: F) -> Pipeline<A>
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<A>> + Send + 'static,
    {
        self.flatten_map(Concurrency::Merge, project)
    }

    /// Start an operation per trigger under an explicit policy
    pub fn flatten_map<F, Fut>(self, policy: Concurrency, project: F) -> Pipeline<A>
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<A>> + Send + 'static,
    {
        let project: AsyncProject<A> = Arc::new(move |action: &A| project(action).boxed());
        self.finish(Stage::Flatten { policy, project })
    }

    fn finish(self, stage: Stage<A>) -> Pipeline<A> {
        Pipeline {
            filter: self.filter,
            predicate: self.predicate,
            stage,
        }
    }
}

/// A filtered action stream with its stage attached
///
/// Produced once per effect by the effect's factory.
pub struct Pipeline<A> {
    filter: KindFilter,
    predicate: Option<Predicate<A>>,
    stage: Stage<A>,
}

impl<A: Action> Pipeline<A> {
    /// Check whether `action` should reach this pipeline's stage
    #[must_use]
    pub fn accepts(&self, action: &A) -> bool {
        self.filter.matches(action) && self.predicate.as_ref().is_none_or(|p| p(action))
    }

    /// The kind filter of this pipeline
    #[must_use]
    pub const fn filter(&self) -> &KindFilter {
        &self.filter
    }

    /// The stage this pipeline runs for accepted actions
    #[must_use]
    pub const fn stage(&self) -> &Stage<A> {
        &self.stage
    }

    /// Whether the stage performs asynchronous operations
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self.stage, Stage::Flatten { .. })
    }
}

impl<A> Clone for Pipeline<A> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            predicate: self.predicate.clone(),
            stage: self.stage.clone(),
        }
    }
}

impl<A> fmt::Debug for Pipeline<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("filter", &self.filter)
            .field("has_predicate", &self.predicate.is_some())
            .field("stage", &self.stage)
            .finish()
    }
}

/// Effect configuration
///
/// Defaults match the common case: a dispatching effect named `"effect"`.
///
/// # Example
///
/// ```ignore
/// let config = EffectConfig::new("update-query-state").non_dispatching();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectConfig {
    id: String,
    dispatch: bool,
}

impl EffectConfig {
    /// Create a dispatching configuration with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dispatch: true,
        }
    }

    /// Discard the pipeline's outputs instead of republishing them
    #[must_use]
    pub fn non_dispatching(self) -> Self {
        self.with_dispatch(false)
    }

    /// Set whether the pipeline's outputs are republished on the bus
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: bool) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// The effect id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether outputs are republished
    #[must_use]
    pub const fn dispatch(&self) -> bool {
        self.dispatch
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self::new("effect")
    }
}

/// A registered unit of reactive logic
pub struct Effect<A> {
    id: String,
    dispatch: bool,
    pipeline: Pipeline<A>,
}

impl<A: Action> Effect<A> {
    /// Build an effect, invoking `factory` exactly once
    ///
    /// The factory receives the unfiltered action stream and returns the
    /// pipeline this effect runs for its whole lifetime, across any number
    /// of runner start/stop cycles.
    pub fn create<F>(config: EffectConfig, factory: F) -> Self
    where
        F: FnOnce(Actions<A>) -> Pipeline<A>,
    {
        Self {
            pipeline: factory(Actions::new()),
            id: config.id,
            dispatch: config.dispatch,
        }
    }

    /// The effect id, unique among effects registered with one runner
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether non-empty outputs are republished on the bus
    #[must_use]
    pub const fn dispatches(&self) -> bool {
        self.dispatch
    }

    /// The pipeline built by the factory
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline<A> {
        &self.pipeline
    }
}

impl<A> Clone for Effect<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            dispatch: self.dispatch,
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("dispatch", &self.dispatch)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Action, Clone, Debug, PartialEq)]
    enum TestAction {
        Opened,
        Loaded { count: usize },
        QueryChanged { query: String },
    }

    #[test]
    fn test_config_defaults() {
        let config = EffectConfig::default();
        assert_eq!(config.id(), "effect");
        assert!(config.dispatch());
        assert!(!EffectConfig::new("x").non_dispatching().dispatch());
    }

    #[test]
    fn test_factory_invoked_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let effect = Effect::<TestAction>::create(EffectConfig::new("once"), move |actions| {
            counter.fetch_add(1, Ordering::SeqCst);
            actions.tap(|_| {})
        });

        let _copy = effect.clone();
        let _pipeline = effect.pipeline();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(effect.id(), "once");
        assert!(effect.dispatches());
    }

    #[test]
    fn test_kind_filter_and_predicate_combine() {
        let effect = Effect::<TestAction>::create(EffectConfig::default(), |actions| {
            actions
                .of_kind(&[TestAction::QUERY_CHANGED])
                .filter(|a| matches!(a, TestAction::QueryChanged { query } if !query.is_empty()))
                .tap(|_| {})
        });
        let pipeline = effect.pipeline();

        assert!(pipeline.accepts(&TestAction::QueryChanged { query: "king".into() }));
        assert!(!pipeline.accepts(&TestAction::QueryChanged { query: String::new() }));
        assert!(!pipeline.accepts(&TestAction::Opened));
    }

    #[test]
    fn test_map_stage_projects_synchronously() {
        let effect = Effect::<TestAction>::create(EffectConfig::default(), |actions| {
            actions
                .of_kind(&[TestAction::OPENED])
                .map(|_| Ok(Some(TestAction::Loaded { count: 3 })))
        });

        let Stage::Map(project) = effect.pipeline().stage() else {
            unreachable!("map builds a synchronous stage");
        };
        assert_eq!(
            project(&TestAction::Opened),
            Ok(Some(TestAction::Loaded { count: 3 }))
        );
        assert!(!effect.pipeline().is_async());
    }

    #[test]
    fn test_tap_emits_nothing() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let effect = Effect::<TestAction>::create(EffectConfig::default(), move |actions| {
            actions.tap(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        let Stage::Map(project) = effect.pipeline().stage() else {
            unreachable!("tap builds a synchronous stage");
        };
        assert_eq!(project(&TestAction::Opened), Ok(None));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flatten_stage_keeps_policy() {
        let effect = Effect::<TestAction>::create(EffectConfig::new("load"), |actions| {
            actions
                .of_kind(&[TestAction::OPENED])
                .exhaust_map(|_| async { Some(TestAction::Loaded { count: 6 }) })
        });

        let Stage::Flatten { policy, project } = effect.pipeline().stage() else {
            unreachable!("exhaust_map builds an asynchronous stage");
        };
        assert_eq!(*policy, Concurrency::Exhaust);
        assert_eq!(
            project(&TestAction::Opened).await,
            Some(TestAction::Loaded { count: 6 })
        );
        assert!(effect.pipeline().is_async());
    }

    #[test]
    fn test_every_flatten_builder_sets_its_policy() {
        let build = |policy: Concurrency| {
            let effect = Effect::<TestAction>::create(EffectConfig::default(), |actions| match policy {
                Concurrency::Exhaust => actions.exhaust_map(|_| async { None }),
                Concurrency::Concat => actions.concat_map(|_| async { None }),
                Concurrency::Switch => actions.switch_map(|_| async { None }),
                Concurrency::Merge => actions.merge_map(|_| async { None }),
            });
            match effect.pipeline().stage() {
                Stage::Flatten { policy, .. } => Some(*policy),
                Stage::Map(_) => None,
            }
        };

        for policy in [
            Concurrency::Exhaust,
            Concurrency::Concat,
            Concurrency::Switch,
            Concurrency::Merge,
        ] {
            assert_eq!(build(policy), Some(policy));
        }
    }
}
