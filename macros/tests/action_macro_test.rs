//! Tests for #[derive(Action)] macro

use composable_effects_core::{Action, KindFilter};

#[derive(Action, Clone, Debug, PartialEq)]
enum PlaylistAction {
    #[kind = "playlist/page/opened"]
    PageOpened,

    #[kind = "playlist/page/queryChanged"]
    QueryChanged { query: String },

    #[kind = "playlist/api/loaded"]
    Loaded(Vec<String>),

    TrackSkipped { position: usize },
}

#[derive(Action, Clone, Debug)]
enum Wrapper<T: Clone + std::fmt::Debug + Send + Sync + 'static> {
    Value(T),
    Empty,
}

#[test]
fn test_unit_variant_kind() {
    assert_eq!(PlaylistAction::PageOpened.kind(), "playlist/page/opened");
}

#[test]
fn test_named_variant_kind() {
    let action = PlaylistAction::QueryChanged {
        query: "blues".to_string(),
    };
    assert_eq!(action.kind(), "playlist/page/queryChanged");
}

#[test]
fn test_tuple_variant_kind() {
    let action = PlaylistAction::Loaded(vec!["Layla".to_string()]);
    assert_eq!(action.kind(), "playlist/api/loaded");
}

#[test]
fn test_kind_defaults_to_variant_name() {
    let action = PlaylistAction::TrackSkipped { position: 3 };
    assert_eq!(action.kind(), "TrackSkipped");
}

#[test]
fn test_generated_constants() {
    assert_eq!(PlaylistAction::PAGE_OPENED, "playlist/page/opened");
    assert_eq!(PlaylistAction::QUERY_CHANGED, "playlist/page/queryChanged");
    assert_eq!(PlaylistAction::LOADED, "playlist/api/loaded");
    assert_eq!(PlaylistAction::TRACK_SKIPPED, "TrackSkipped");
}

#[test]
fn test_kinds_are_unique_and_ordered() {
    let kinds = PlaylistAction::kinds();
    assert_eq!(
        kinds,
        &[
            "playlist/page/opened",
            "playlist/page/queryChanged",
            "playlist/api/loaded",
            "TrackSkipped",
        ]
    );

    let mut deduped = kinds.to_vec();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), kinds.len());
}

#[test]
fn test_constants_drive_filters() {
    let filter = KindFilter::new(&[PlaylistAction::PAGE_OPENED, PlaylistAction::LOADED]);
    assert!(filter.matches(&PlaylistAction::PageOpened));
    assert!(filter.matches(&PlaylistAction::Loaded(vec![])));
    assert!(!filter.matches(&PlaylistAction::TrackSkipped { position: 0 }));
}

#[test]
fn test_generic_enum() {
    assert_eq!(Wrapper::Value(7_u32).kind(), "Value");
    assert_eq!(Wrapper::<u32>::Empty.kind(), Wrapper::<u32>::EMPTY);
    assert_eq!(Wrapper::<String>::kinds(), &["Value", "Empty"]);
}
