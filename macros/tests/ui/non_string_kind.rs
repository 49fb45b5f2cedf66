//! Kinds are string literals.
#![allow(dead_code)]

use composable_effects_macros::Action;

#[derive(Action, Clone, Debug)]
enum Playback {
    #[kind = 42]
    Play,
}

fn main() {}
