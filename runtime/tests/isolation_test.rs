//! Integration tests for per-effect failure isolation
//!
//! A failing effect is terminated on its own. The bus, the store and every
//! other effect keep working, and the failure is reported exactly once.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use composable_effects_core::{Action, Clock, Effect, EffectConfig, EffectError};
use composable_effects_runtime::{
    ActionBus, EffectsRunner, EffectsSystem, HealthStatus, RunnerConfig, project_into,
};
use composable_effects_testing::{ActionRecorder, CollectingErrorHandler, test_clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Action, Clone, Debug, PartialEq)]
enum Signal {
    #[kind = "signal/ping"]
    Ping,
    #[kind = "signal/pong"]
    Pong,
    #[kind = "signal/explode"]
    Explode,
}

fn pong_effect() -> Effect<Signal> {
    Effect::create(EffectConfig::new("pong"), |actions| {
        actions.of_kind(&[Signal::PING]).merge_map(|_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Some(Signal::Pong)
        })
    })
}

fn detonate() -> Option<Signal> {
    panic!("operation blew up")
}

fn exploding_async_effect() -> Effect<Signal> {
    Effect::create(EffectConfig::new("explode-async"), |actions| {
        actions.of_kind(&[Signal::EXPLODE]).merge_map(|_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            detonate()
        })
    })
}

fn exploding_sync_effect() -> Effect<Signal> {
    Effect::create(EffectConfig::new("explode-sync"), |actions| {
        actions
            .of_kind(&[Signal::EXPLODE])
            .map(|_| Err(EffectError::failed("refused")))
    })
}

fn config(errors: &CollectingErrorHandler) -> RunnerConfig {
    RunnerConfig::default()
        .with_error_handler(errors.clone())
        .with_clock(test_clock())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_async_panic_terminates_only_that_effect() {
    let errors = CollectingErrorHandler::new();
    let bus = ActionBus::new();
    let runner = EffectsRunner::with_config(bus.clone(), config(&errors));
    runner
        .register_effects(vec![pong_effect(), exploding_async_effect()])
        .unwrap();
    runner.start().unwrap();
    let recorder = ActionRecorder::new(&bus);

    bus.publish(Signal::Explode);
    settle().await;

    assert_eq!(errors.effect_ids(), vec!["explode-async".to_string()]);
    assert!(matches!(errors.failures()[0].1, EffectError::Panicked(ref m) if m.contains("operation blew up")));
    assert_eq!(runner.failed_effects(), vec!["explode-async".to_string()]);

    bus.publish(Signal::Ping);
    let pong = recorder.wait_for_kind(Signal::PONG, Duration::from_secs(1)).await;
    assert_eq!(pong, Some(Signal::Pong));

    // A terminated effect never reacts again, so it never fails again.
    bus.publish(Signal::Explode);
    settle().await;
    assert_eq!(errors.effect_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_log_records_trigger_and_time() {
    let errors = CollectingErrorHandler::new();
    let bus = ActionBus::new();
    let runner = EffectsRunner::with_config(bus.clone(), config(&errors));
    runner
        .register_effects(vec![pong_effect(), exploding_sync_effect()])
        .unwrap();
    runner.start().unwrap();

    bus.publish(Signal::Explode);

    let record = runner.failures().latest().unwrap();
    assert_eq!(record.effect_id, "explode-sync");
    assert_eq!(record.trigger_kind, Some(Signal::EXPLODE));
    assert_eq!(record.error, EffectError::failed("refused"));
    assert_eq!(record.occurred_at, test_clock().now());
}

#[tokio::test(start_paused = true)]
async fn test_health_reflects_failed_effects() {
    let errors = CollectingErrorHandler::new();
    let bus = ActionBus::new();
    let runner = EffectsRunner::with_config(bus.clone(), config(&errors));
    runner
        .register_effects(vec![pong_effect(), exploding_sync_effect(), exploding_async_effect()])
        .unwrap();
    runner.start().unwrap();
    assert_eq!(runner.health().status, HealthStatus::Healthy);

    bus.publish(Signal::Explode);
    settle().await;

    let health = runner.health();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.metadata_value("failed"), Some("2"));
    assert_eq!(health.metadata_value("registered"), Some("3"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_revives_failed_effects() {
    let errors = CollectingErrorHandler::new();
    let bus = ActionBus::new();
    let runner = EffectsRunner::with_config(bus.clone(), config(&errors));
    runner.register_effects(vec![exploding_sync_effect()]).unwrap();
    runner.start().unwrap();

    bus.publish(Signal::Explode);
    assert_eq!(runner.health().status, HealthStatus::Unhealthy);

    runner.stop();
    runner.start().unwrap();
    assert!(runner.failed_effects().is_empty());

    bus.publish(Signal::Explode);
    assert_eq!(errors.effect_ids().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_store_keeps_working_after_effect_failure() {
    let errors = CollectingErrorHandler::new();
    let system = EffectsSystem::with_config(0_u32, config(&errors));
    let pings = project_into(
        system.store(),
        EffectConfig::new("count-pings"),
        &[Signal::PING],
        |count: &u32, _: &Signal| count + 1,
    );
    let seen = Arc::new(AtomicUsize::new(0));
    let observer = Arc::clone(&seen);
    let _subscription = system.subscribe(move |_| {
        observer.fetch_add(1, Ordering::SeqCst);
    });

    system
        .runner()
        .register_effects(vec![pings, exploding_sync_effect()])
        .unwrap();
    system.runner().start().unwrap();

    system.dispatch(Signal::Ping);
    system.dispatch(Signal::Explode);
    system.dispatch(Signal::Ping);

    assert_eq!(*system.snapshot(), 2);
    // Initial delivery plus one per update.
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(errors.effect_ids(), vec!["explode-sync".to_string()]);
}
