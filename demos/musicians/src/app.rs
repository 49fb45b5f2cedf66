//! The musicians application facade.
//!
//! Wires the musicians effects into an [`EffectsSystem`] and exposes the
//! operations a presentation layer needs: lifecycle, dispatch, state reads
//! and subscriptions.

use crate::actions::MusiciansAction;
use crate::config::MusiciansConfig;
use crate::effects::musicians_effects;
use crate::model::Musician;
use crate::state::{MusiciansState, selectors, subscribe};
use composable_effects_core::environment::DataSource;
use composable_effects_runtime::{
    EffectsSystem, HealthCheck, RunnerConfig, RunnerError, StateStore, Subscription,
};
use std::sync::Arc;

/// The musicians page, ready to be driven by a UI
///
/// # Example
///
/// ```ignore
/// let app = MusiciansApp::new(Arc::new(MusiciansService::default()), &MusiciansConfig::default())?;
/// app.initialize_effects()?;
///
/// let _sub = app.subscribe_filtered(|musicians| println!("{} shown", musicians.len()));
/// app.dispatch_page_opened();
/// app.wait_until_loaded().await;
/// app.dispatch_query_changed("king");
///
/// app.cleanup();
/// ```
pub struct MusiciansApp {
    system: EffectsSystem<MusiciansAction, MusiciansState>,
}

impl MusiciansApp {
    /// Build the app with every effect registered, not yet started
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the effects cannot be registered.
    pub fn new(api: Arc<dyn DataSource<Musician>>, config: &MusiciansConfig) -> Result<Self, RunnerError> {
        Self::with_runner_config(
            api,
            config,
            RunnerConfig::default().with_effect_buffer(config.effect_buffer),
        )
    }

    /// Build the app with a custom runner configuration
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the effects cannot be registered.
    pub fn with_runner_config(
        api: Arc<dyn DataSource<Musician>>,
        config: &MusiciansConfig,
        runner_config: RunnerConfig,
    ) -> Result<Self, RunnerError> {
        let system = EffectsSystem::with_config(MusiciansState::default(), runner_config);
        let effects = musicians_effects(system.store(), api, config.load_timeout());
        system.runner().register_effects(effects)?;
        Ok(Self { system })
    }

    /// Start reacting to actions
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::RuntimeUnavailable`] outside a Tokio runtime.
    pub fn initialize_effects(&self) -> Result<(), RunnerError> {
        self.system.runner().start()
    }

    /// Stop reacting to actions; state is kept
    pub fn cleanup(&self) {
        self.system.runner().stop();
    }

    /// The user opened the page
    pub fn dispatch_page_opened(&self) {
        self.system.dispatch(MusiciansAction::PageOpened);
    }

    /// The user typed a new query
    pub fn dispatch_query_changed(&self, query: impl Into<String>) {
        self.system.dispatch(MusiciansAction::query_changed(query));
    }

    /// Publish any musicians action
    pub fn dispatch(&self, action: MusiciansAction) {
        self.system.dispatch(action);
    }

    /// The current snapshot
    #[must_use]
    pub fn current_state(&self) -> Arc<MusiciansState> {
        self.system.snapshot()
    }

    /// Musicians matching the current query
    #[must_use]
    pub fn filtered_musicians(&self) -> Vec<Musician> {
        self.system.store().select(selectors::select_filtered_musicians)
    }

    /// Observe every snapshot
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&MusiciansState) + Send + Sync + 'static,
    {
        subscribe::to_state(self.system.store(), handler)
    }

    /// Observe the filtered list, only when it changes
    pub fn subscribe_filtered<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[Musician]) + Send + Sync + 'static,
    {
        subscribe::to_filtered_musicians(self.system.store(), handler)
    }

    /// Wait until no load is in flight and return that snapshot
    pub async fn wait_until_loaded(&self) -> Arc<MusiciansState> {
        let mut snapshots = self.system.store().watch();
        match snapshots.wait_for(|state| !state.is_loading).await {
            Ok(state) => Arc::clone(&state),
            // The store owns the sender, so this only happens while tearing down.
            Err(_) => self.current_state(),
        }
    }

    /// Runner health
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        self.system.runner().health()
    }

    /// Whether effects are running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.system.runner().is_running()
    }

    /// The state store
    #[must_use]
    pub const fn store(&self) -> &StateStore<MusiciansState> {
        self.system.store()
    }

    /// The underlying effects system
    #[must_use]
    pub const fn system(&self) -> &EffectsSystem<MusiciansAction, MusiciansState> {
        &self.system
    }
}
