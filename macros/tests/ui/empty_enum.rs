//! An action vocabulary needs at least one kind.
#![allow(dead_code)]

use composable_effects_macros::Action;

#[derive(Action)]
enum Silence {}

fn main() {}
