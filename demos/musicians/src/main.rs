//! Musicians demo binary
//!
//! Runs a scripted session against the mock backend: open the page, wait
//! for the load, then search a few names.

use anyhow::Context;
use composable_effects_runtime::metrics::MetricsServer;
use musicians::{Musician, MusiciansApp, MusiciansConfig, MusiciansService};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const QUERIES: [&str; 5] = ["Eric", "King", "Vaughan", "", "Mozart"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "musicians=info,composable_effects_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MusiciansConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(?config, "Configuration loaded");

    let mut metrics = MetricsServer::new();
    if config.metrics {
        metrics.start().context("Failed to install metrics recorder")?;
    }

    println!("=== Musicians: Composable Effects Demo ===\n");

    let service = Arc::new(MusiciansService::new(config.load_delay()));
    let app = MusiciansApp::new(service, &config).context("Failed to register effects")?;
    app.initialize_effects().context("Failed to start effects")?;

    let _filtered = app.subscribe_filtered(|musicians| {
        println!("  shown: {}", names(musicians));
    });

    println!(">>> Opening page");
    app.dispatch_page_opened();
    // Ignored: a load is already in flight.
    app.dispatch_page_opened();

    let state = app.wait_until_loaded().await;
    match &state.error {
        Some(message) => println!("Load failed: {message}"),
        None => println!("Loaded {} musicians", state.musicians.len()),
    }

    for query in QUERIES {
        println!("\n>>> Searching {query:?}");
        app.dispatch_query_changed(query);
    }

    let state = app.current_state();
    println!("\n=== Final state ===");
    println!("{}", serde_json::to_string_pretty(state.as_ref())?);

    let health = app.health();
    println!("\nRunner health: {:?}", health.status);

    app.cleanup();

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}

fn names(musicians: &[Musician]) -> String {
    if musicians.is_empty() {
        return "(none)".to_string();
    }
    musicians
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
