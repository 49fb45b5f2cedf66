//! The derive only applies to enums.
#![allow(dead_code)]

use composable_effects_macros::Action;

#[derive(Action)]
struct Track;

fn main() {}
