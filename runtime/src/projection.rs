//! Effects that project actions into the state store.
//!
//! A projection is the reducer half of the architecture: a pure function
//! `(&State, &Action) -> State`, run by a non-dispatching effect. It is the
//! only sanctioned way to call [`StateStore::apply`].

use crate::store::StateStore;
use composable_effects_core::action::Action;
use composable_effects_core::effect::{Effect, EffectConfig};
use std::sync::Arc;

/// Build a non-dispatching effect that applies `handler` to the store
///
/// The effect reacts to actions whose kind is in `kinds` and replaces the
/// current snapshot with `handler(snapshot, action)`. Because it runs as a
/// synchronous stage, the new snapshot is visible as soon as the triggering
/// `publish` returns. The `dispatch` flag of `config` is ignored.
///
/// # Example
///
/// ```ignore
/// let update_query = project_into(
///     &store,
///     EffectConfig::new("update-query-state"),
///     &[SearchAction::QUERY_CHANGED],
///     |state: &SearchState, action: &SearchAction| match action {
///         SearchAction::QueryChanged { query } => SearchState { query: query.clone(), ..state.clone() },
///         _ => state.clone(),
///     },
/// );
/// ```
pub fn project_into<A, S, F>(
    store: &StateStore<S>,
    config: EffectConfig,
    kinds: &[&'static str],
    handler: F,
) -> Effect<A>
where
    A: Action,
    S: Send + Sync + 'static,
    F: Fn(&S, &A) -> S + Send + Sync + 'static,
{
    let store = store.clone();
    let handler = Arc::new(handler);

    Effect::create(config.non_dispatching(), move |actions| {
        actions.of_kind(kinds).tap(move |action: &A| {
            let action = action.clone();
            let handler = Arc::clone(&handler);
            store.apply(move |state| handler(state, &action));
        })
    })
}
