//! Musicians page state.
//!
//! - [`MusiciansState`]: the snapshot held by the store
//! - [`handlers`]: pure projections `(&State, &Action) -> State`
//! - [`selectors`]: pure reads over a snapshot
//! - [`subscribe`]: store subscriptions for presentation layers

use crate::model::Musician;
use serde::Serialize;

/// Snapshot of the musicians page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MusiciansState {
    /// Last successfully loaded musicians
    pub musicians: Vec<Musician>,
    /// Whether a load is in flight
    pub is_loading: bool,
    /// Current search query
    pub query: String,
    /// Message of the last failed load, cleared by the next open or success
    pub error: Option<String>,
}

/// State projection handlers
///
/// Each handler reacts to one action kind and returns `state` unchanged
/// for any other action.
pub mod handlers {
    use super::MusiciansState;
    use crate::actions::MusiciansAction;

    /// Loading starts and any previous error is cleared
    pub fn page_opened(state: &MusiciansState, _action: &MusiciansAction) -> MusiciansState {
        MusiciansState {
            is_loading: true,
            error: None,
            ..state.clone()
        }
    }

    /// The query is replaced verbatim
    pub fn query_changed(state: &MusiciansState, action: &MusiciansAction) -> MusiciansState {
        match action {
            MusiciansAction::QueryChanged { query } => MusiciansState {
                query: query.clone(),
                ..state.clone()
            },
            _ => state.clone(),
        }
    }

    /// The list is replaced and loading ends
    pub fn loaded_success(state: &MusiciansState, action: &MusiciansAction) -> MusiciansState {
        match action {
            MusiciansAction::LoadedSuccess { musicians } => MusiciansState {
                musicians: musicians.clone(),
                is_loading: false,
                error: None,
                ..state.clone()
            },
            _ => state.clone(),
        }
    }

    /// Loading ends with an error; the last known list is kept
    pub fn loaded_failure(state: &MusiciansState, action: &MusiciansAction) -> MusiciansState {
        match action {
            MusiciansAction::LoadedFailure { message } => MusiciansState {
                is_loading: false,
                error: Some(message.clone()),
                ..state.clone()
            },
            _ => state.clone(),
        }
    }
}

/// Selectors over a snapshot
pub mod selectors {
    use super::MusiciansState;
    use crate::model::Musician;

    /// Every loaded musician
    #[must_use]
    pub fn select_musicians(state: &MusiciansState) -> &[Musician] {
        &state.musicians
    }

    /// Whether a load is in flight
    #[must_use]
    pub const fn select_is_loading(state: &MusiciansState) -> bool {
        state.is_loading
    }

    /// The current query
    #[must_use]
    pub fn select_query(state: &MusiciansState) -> &str {
        &state.query
    }

    /// The last load error
    #[must_use]
    pub fn select_error(state: &MusiciansState) -> Option<&str> {
        state.error.as_deref()
    }

    /// Musicians whose name contains the query, ignoring case, in list order
    #[must_use]
    pub fn select_filtered_musicians(state: &MusiciansState) -> Vec<Musician> {
        filter_by_query(&state.musicians, &state.query)
    }

    /// Case-insensitive substring filter; an empty query keeps everything
    #[must_use]
    pub fn filter_by_query(musicians: &[Musician], query: &str) -> Vec<Musician> {
        let query = query.to_lowercase();
        musicians
            .iter()
            .filter(|m| m.name.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Whether two lists hold the same musicians in the same order, by id
    #[must_use]
    pub fn same_ids(previous: &[Musician], next: &[Musician]) -> bool {
        previous.len() == next.len() && previous.iter().zip(next).all(|(a, b)| a.id == b.id)
    }
}

/// Store subscriptions for presentation layers
///
/// Every subscription delivers the current value immediately. Drop the
/// returned [`Subscription`] to stop observing.
pub mod subscribe {
    use super::MusiciansState;
    use super::selectors::{same_ids, select_filtered_musicians};
    use crate::model::Musician;
    use composable_effects_runtime::{StateStore, Subscription};

    /// Every snapshot
    pub fn to_state<F>(store: &StateStore<MusiciansState>, handler: F) -> Subscription
    where
        F: Fn(&MusiciansState) + Send + Sync + 'static,
    {
        store.subscribe_to_snapshots(handler)
    }

    /// The musicians list of every snapshot
    pub fn to_musicians<F>(store: &StateStore<MusiciansState>, handler: F) -> Subscription
    where
        F: Fn(&[Musician]) + Send + Sync + 'static,
    {
        store.subscribe_to_snapshots(move |state| handler(&state.musicians))
    }

    /// The filtered list, only when its id sequence changes
    pub fn to_filtered_musicians<F>(store: &StateStore<MusiciansState>, handler: F) -> Subscription
    where
        F: Fn(&[Musician]) + Send + Sync + 'static,
    {
        store.subscribe_selected_by(
            select_filtered_musicians,
            |previous: &Vec<Musician>, next: &Vec<Musician>| same_ids(previous, next),
            move |musicians: &Vec<Musician>| handler(musicians),
        )
    }

    /// The loading flag of every snapshot
    pub fn to_is_loading<F>(store: &StateStore<MusiciansState>, handler: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        store.subscribe_to_snapshots(move |state| handler(state.is_loading))
    }

    /// The query of every snapshot
    pub fn to_query<F>(store: &StateStore<MusiciansState>, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        store.subscribe_to_snapshots(move |state| handler(&state.query))
    }

    /// The error of every snapshot
    pub fn to_error<F>(store: &StateStore<MusiciansState>, handler: F) -> Subscription
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        store.subscribe_to_snapshots(move |state| handler(state.error.as_deref()))
    }
}
