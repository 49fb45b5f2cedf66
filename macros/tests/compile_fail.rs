//! Compile errors reported by #[derive(Action)]

#[test]
fn test_invalid_action_enums_are_rejected() {
    let cases = trybuild::TestCases::new();
    cases.compile_fail("tests/ui/*.rs");
}
