//! Two variants resolving to the same kind.
#![allow(dead_code)]
use composable_effects_macros::Action;

#[derive(Action, Clone, Debug)]
enum Playback {
    #[kind = "Resume"]
    Play,
    Resume,
}

fn main() {}
