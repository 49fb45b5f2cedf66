//! Property tests for delivery ordering on the bus and the store

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use composable_effects_core::{Action, Effect, EffectConfig};
use composable_effects_runtime::{ActionBus, EffectsRunner, StateStore};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Action, Clone, Debug, PartialEq)]
enum Countdown {
    Tick(u8),
}

/// Model of trampolined delivery: a FIFO queue of pending actions where
/// `Tick(n)` enqueues `fanout` copies of `Tick(n - 1)`
fn expected_deliveries(seeds: &[u8], fanout: usize) -> Vec<u8> {
    let mut delivered = Vec::new();
    for &seed in seeds {
        let mut queue = VecDeque::from([seed]);
        while let Some(n) = queue.pop_front() {
            delivered.push(n);
            if n > 0 {
                queue.extend(std::iter::repeat_n(n - 1, fanout));
            }
        }
    }
    delivered
}

proptest! {
    #[test]
    fn prop_nested_publishes_are_delivered_breadth_first(
        seeds in prop::collection::vec(0_u8..5, 0..6),
        fanout in 1_usize..3,
    ) {
        let bus = ActionBus::new();
        let runner = EffectsRunner::new(bus.clone());
        let effects: Vec<Effect<Countdown>> = (0..fanout)
            .map(|i| {
                Effect::<Countdown>::create(EffectConfig::new(format!("countdown-{i}")), |actions| {
                    actions.map(|Countdown::Tick(n)| Ok(n.checked_sub(1).map(Countdown::Tick)))
                })
            })
            .collect();
        runner.register_effects(effects).unwrap();
        runner.start().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = bus.subscribe(move |Countdown::Tick(n): &Countdown| {
            sink.lock().unwrap().push(*n);
        });

        for &seed in &seeds {
            bus.publish(Countdown::Tick(seed));
        }

        prop_assert_eq!(seen.lock().unwrap().clone(), expected_deliveries(&seeds, fanout));
    }

    #[test]
    fn prop_every_subscriber_sees_the_same_sequence(
        values in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        let bus = ActionBus::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        let _a = bus.subscribe(move |Countdown::Tick(n): &Countdown| sink.lock().unwrap().push(*n));
        let sink = Arc::clone(&second);
        let _b = bus.subscribe(move |Countdown::Tick(n): &Countdown| sink.lock().unwrap().push(*n));

        for &value in &values {
            bus.publish(Countdown::Tick(value));
        }

        prop_assert_eq!(first.lock().unwrap().clone(), values.clone());
        prop_assert_eq!(second.lock().unwrap().clone(), values);
    }

    #[test]
    fn prop_store_updates_compose_in_order(
        deltas in prop::collection::vec(-100_i64..100, 0..32),
    ) {
        let store = StateStore::new(Vec::<i64>::new());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let _subscription = store.subscribe_to_snapshots(move |history: &Vec<i64>| {
            sink.lock().unwrap().push(history.len());
        });

        for &delta in &deltas {
            store.apply(move |history| {
                let mut next = history.clone();
                next.push(delta);
                next
            });
        }

        prop_assert_eq!(&*store.get_snapshot(), &deltas);
        let expected_lengths: Vec<usize> = (0..=deltas.len()).collect();
        prop_assert_eq!(observed.lock().unwrap().clone(), expected_lengths);
    }
}
