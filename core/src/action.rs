//! Actions and kind-based filtering.
//!
//! An action is an immutable, typed envelope describing something that
//! happened: a user interaction, an API result, a timer firing. Each action
//! vocabulary is a closed enum; the variant is the discriminant and
//! [`Action::kind`] exposes a stable string identifier for it.
//!
//! Kinds are unique within a vocabulary. `#[derive(Action)]` enforces this at
//! compile time, so a filter on a kind string can never match two variants.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Action, Clone, Debug)]
//! enum SearchAction {
//!     #[kind = "search/page/opened"]
//!     PageOpened,
//!     #[kind = "search/page/queryChanged"]
//!     QueryChanged { query: String },
//! }
//!
//! let filter = KindFilter::new(&[SearchAction::QUERY_CHANGED]);
//! assert!(filter.matches(&SearchAction::QueryChanged { query: "king".into() }));
//! assert!(!filter.matches(&SearchAction::PageOpened));
//! ```

use smallvec::SmallVec;
use std::fmt::Debug;

/// An action that can be published on the action bus
///
/// Actions should be:
/// - `Clone`: every subscriber and every effect receives its own copy
/// - `Debug`: actions are logged when dispatched
/// - `Send + Sync + 'static`: actions cross into worker tasks
///
/// Use `#[derive(Action)]` to implement this trait for an enum.
pub trait Action: Clone + Debug + Send + Sync + 'static {
    /// The stable identifier of this action's variant
    fn kind(&self) -> &'static str;

    /// Every kind in this action vocabulary, in declaration order
    fn kinds() -> &'static [&'static str];
}

/// A set of action kinds an effect or subscriber is interested in
///
/// An empty filter built with [`KindFilter::any`] matches every action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindFilter {
    kinds: Option<SmallVec<[&'static str; 4]>>,
}

impl KindFilter {
    /// Match only actions whose kind is in `kinds`
    #[must_use]
    pub fn new(kinds: &[&'static str]) -> Self {
        Self {
            kinds: Some(kinds.iter().copied().collect()),
        }
    }

    /// Match every action
    #[must_use]
    pub const fn any() -> Self {
        Self { kinds: None }
    }

    /// Check whether `action` passes this filter
    #[must_use]
    pub fn matches<A: Action>(&self, action: &A) -> bool {
        self.matches_kind(action.kind())
    }

    /// Check whether a kind string passes this filter
    #[must_use]
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.iter().any(|k| *k == kind))
    }

    /// The kinds this filter accepts, or `None` if it accepts everything
    #[must_use]
    pub fn kinds(&self) -> Option<&[&'static str]> {
        self.kinds.as_deref()
    }
}
