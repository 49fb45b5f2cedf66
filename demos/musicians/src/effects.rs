//! Musicians effects.
//!
//! | id | reacts to | policy | dispatches |
//! |---|---|---|---|
//! | `load-all-musicians` | page opened | exhaust | success or failure |
//! | `update-loading-state` | page opened | sync | no |
//! | `update-musicians-state` | loaded success | sync | no |
//! | `update-failure-state` | loaded failure | sync | no |
//! | `update-query-state` | query changed | sync | no |
//! | `logging` | every action | sync | no |

use crate::actions::MusiciansAction;
use crate::model::Musician;
use crate::state::{MusiciansState, handlers};
use composable_effects_core::environment::DataSource;
use composable_effects_core::{Action, Effect, EffectConfig, OperationError, map_response, with_timeout};
use composable_effects_runtime::{StateStore, project_into};
use std::sync::Arc;
use std::time::Duration;

/// Load every musician when the page opens
///
/// Uses the exhaust policy: while a load is in flight, further page-open
/// actions are ignored. The outcome is always exactly one action, and a
/// timeout is reported as a failure like any other.
pub fn load_all_musicians(
    api: Arc<dyn DataSource<Musician>>,
    timeout: Option<Duration>,
) -> Effect<MusiciansAction> {
    Effect::create(EffectConfig::new("load-all-musicians"), move |actions| {
        actions
            .of_kind(&[MusiciansAction::PAGE_OPENED])
            .exhaust_map(move |_| {
                let api = Arc::clone(&api);
                async move {
                    let outcome = map_response(
                        with_timeout(timeout, api.fetch_all()),
                        |musicians| MusiciansAction::LoadedSuccess { musicians },
                        |error: OperationError| MusiciansAction::LoadedFailure {
                            message: error.to_string(),
                        },
                    )
                    .await;
                    Some(outcome)
                }
            })
    })
}

/// Mark the page as loading when it opens
pub fn update_loading_state(store: &StateStore<MusiciansState>) -> Effect<MusiciansAction> {
    project_into(
        store,
        EffectConfig::new("update-loading-state"),
        &[MusiciansAction::PAGE_OPENED],
        handlers::page_opened,
    )
}

/// Store the loaded musicians
pub fn update_musicians_state(store: &StateStore<MusiciansState>) -> Effect<MusiciansAction> {
    project_into(
        store,
        EffectConfig::new("update-musicians-state"),
        &[MusiciansAction::LOADED_SUCCESS],
        handlers::loaded_success,
    )
}

/// Store the failure message
pub fn update_failure_state(store: &StateStore<MusiciansState>) -> Effect<MusiciansAction> {
    project_into(
        store,
        EffectConfig::new("update-failure-state"),
        &[MusiciansAction::LOADED_FAILURE],
        handlers::loaded_failure,
    )
}

/// Store the search query
pub fn update_query_state(store: &StateStore<MusiciansState>) -> Effect<MusiciansAction> {
    project_into(
        store,
        EffectConfig::new("update-query-state"),
        &[MusiciansAction::QUERY_CHANGED],
        handlers::query_changed,
    )
}

/// Log every musicians action
pub fn logging() -> Effect<MusiciansAction> {
    Effect::create(EffectConfig::new("logging").non_dispatching(), |actions| {
        actions.of_kind(MusiciansAction::kinds()).tap(|action: &MusiciansAction| {
            tracing::info!(kind = action.kind(), "Action");
            match serde_json::to_string(action) {
                Ok(payload) => tracing::debug!(kind = action.kind(), %payload, "Action payload"),
                Err(error) => tracing::debug!(kind = action.kind(), %error, "Action payload not serializable"),
            }
        })
    })
}

/// Every musicians effect, in registration order
pub fn musicians_effects(
    store: &StateStore<MusiciansState>,
    api: Arc<dyn DataSource<Musician>>,
    load_timeout: Option<Duration>,
) -> Vec<Effect<MusiciansAction>> {
    vec![
        load_all_musicians(api, load_timeout),
        update_loading_state(store),
        update_musicians_state(store),
        update_failure_state(store),
        update_query_state(store),
        logging(),
    ]
}
