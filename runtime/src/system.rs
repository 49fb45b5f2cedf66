//! The effects system: one bus, one store and one runner.
//!
//! Constructed once at process start and passed by reference to whatever
//! needs to publish actions or read state. Independent systems share
//! nothing, so tests can build as many as they like.

use crate::bus::{ActionBus, Subscription};
use crate::runner::EffectsRunner;
use crate::store::StateStore;
use crate::RunnerConfig;
use composable_effects_core::action::Action;
use std::fmt;
use std::sync::Arc;

/// Context object owning the bus, the store and the runner
///
/// # Example
///
/// ```ignore
/// let system = EffectsSystem::new(SearchState::default());
/// system.runner().register_effects(search_effects(system.store(), api))?;
/// system.runner().start()?;
///
/// system.dispatch(SearchAction::PageOpened);
/// let snapshot = system.snapshot();
/// ```
pub struct EffectsSystem<A: Action, S> {
    bus: ActionBus<A>,
    store: StateStore<S>,
    runner: EffectsRunner<A>,
}

impl<A: Action, S: Send + Sync + 'static> EffectsSystem<A, S> {
    /// Create a system with the default runner configuration
    #[must_use]
    pub fn new(initial_state: S) -> Self {
        Self::with_config(initial_state, RunnerConfig::default())
    }

    /// Create a system with a custom runner configuration
    #[must_use]
    pub fn with_config(initial_state: S, config: RunnerConfig) -> Self {
        let bus = ActionBus::new();
        Self {
            runner: EffectsRunner::with_config(bus.clone(), config),
            store: StateStore::new(initial_state),
            bus,
        }
    }

    /// Publish an action on the bus
    pub fn dispatch(&self, action: A) {
        tracing::debug!(kind = action.kind(), "Dispatching action");
        self.bus.publish(action);
    }

    /// The current state snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<S> {
        self.store.get_snapshot()
    }

    /// Observe the current snapshot and every later one
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.store.subscribe_to_snapshots(handler)
    }

    /// The action bus
    #[must_use]
    pub const fn bus(&self) -> &ActionBus<A> {
        &self.bus
    }

    /// The state store
    #[must_use]
    pub const fn store(&self) -> &StateStore<S> {
        &self.store
    }

    /// The effects runner
    #[must_use]
    pub const fn runner(&self) -> &EffectsRunner<A> {
        &self.runner
    }
}

impl<A: Action, S: fmt::Debug + Send + Sync + 'static> fmt::Debug for EffectsSystem<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectsSystem")
            .field("bus", &self.bus)
            .field("store", &self.store)
            .field("runner", &self.runner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::projection::project_into;
    use composable_effects_core::{Action, EffectConfig};

    #[derive(Action, Clone, Debug)]
    enum Toggle {
        Flip,
    }

    fn flip_effect(store: &StateStore<bool>) -> composable_effects_core::Effect<Toggle> {
        project_into(store, EffectConfig::new("flip"), &[Toggle::FLIP], |on: &bool, _: &Toggle| !on)
    }

    #[test]
    fn test_systems_are_independent() {
        let first = EffectsSystem::new(false);
        let second = EffectsSystem::new(false);
        first.runner().register_effects(vec![flip_effect(first.store())]).unwrap();
        second.runner().register_effects(vec![flip_effect(second.store())]).unwrap();
        first.runner().start().unwrap();
        second.runner().start().unwrap();

        first.dispatch(Toggle::Flip);
        assert!(*first.snapshot());
        assert!(!*second.snapshot());
    }

    #[test]
    fn test_stop_keeps_state() {
        let system = EffectsSystem::new(false);
        system.runner().register_effects(vec![flip_effect(system.store())]).unwrap();
        system.runner().start().unwrap();
        system.dispatch(Toggle::Flip);
        system.runner().stop();

        system.dispatch(Toggle::Flip);
        assert!(*system.snapshot());
    }
}
