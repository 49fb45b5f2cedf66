//! The musicians action vocabulary.
//!
//! Page actions come from the user; API actions are dispatched by the
//! load effect once the backend call settles.

use crate::model::Musician;
use composable_effects_core::Action;
use serde::{Deserialize, Serialize};

/// Everything that can happen on the musicians page
#[derive(Action, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusiciansAction {
    /// The page was opened and musicians should be loaded
    #[kind = "musicians/page/opened"]
    PageOpened,

    /// The search query changed
    #[kind = "musicians/page/queryChanged"]
    QueryChanged {
        /// New query text, as typed
        query: String,
    },

    /// The backend returned the musicians
    #[kind = "musicians/api/loadedSuccess"]
    LoadedSuccess {
        /// Every valid musician, in backend order
        musicians: Vec<Musician>,
    },

    /// The backend call failed
    #[kind = "musicians/api/loadedFailure"]
    LoadedFailure {
        /// Human-readable reason
        message: String,
    },
}

impl MusiciansAction {
    /// Shorthand for [`MusiciansAction::QueryChanged`]
    pub fn query_changed(query: impl Into<String>) -> Self {
        Self::QueryChanged {
            query: query.into(),
        }
    }

    /// Shorthand for [`MusiciansAction::LoadedFailure`]
    pub fn loaded_failure(message: impl Into<String>) -> Self {
        Self::LoadedFailure {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_match_wire_names() {
        assert_eq!(MusiciansAction::PageOpened.kind(), "musicians/page/opened");
        assert_eq!(MusiciansAction::query_changed("x").kind(), MusiciansAction::QUERY_CHANGED);
        assert_eq!(MusiciansAction::LOADED_SUCCESS, "musicians/api/loadedSuccess");
        assert_eq!(MusiciansAction::loaded_failure("x").kind(), "musicians/api/loadedFailure");
        assert_eq!(MusiciansAction::kinds().len(), 4);
    }
}
