//! # Musicians
//!
//! A musicians search page built on the composable effects runtime.
//!
//! Opening the page loads musicians from a (mock) backend through an
//! exhaust-policy effect; typing a query filters the loaded list. All state
//! changes go through non-dispatching projection effects.
//!
//! ## Modules
//!
//! - [`model`]: the `Musician` record
//! - [`actions`]: the action vocabulary
//! - [`state`]: snapshot, projection handlers, selectors, subscriptions
//! - [`service`]: the mock backend
//! - [`effects`]: the effects wiring actions to the backend and the store
//! - [`app`]: the facade a UI drives
//! - [`config`]: environment configuration
//!
//! ## Example
//!
//! ```no_run
//! use musicians::{MusiciansApp, MusiciansConfig, MusiciansService};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MusiciansConfig::default();
//! let app = MusiciansApp::new(Arc::new(MusiciansService::new(config.load_delay())), &config)?;
//! app.initialize_effects()?;
//!
//! app.dispatch_page_opened();
//! let state = app.wait_until_loaded().await;
//! assert_eq!(state.musicians.len(), 6);
//!
//! app.dispatch_query_changed("king");
//! assert_eq!(app.filtered_musicians()[0].name, "B.B. King");
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod app;
pub mod config;
pub mod effects;
pub mod model;
pub mod service;
pub mod state;

pub use actions::MusiciansAction;
pub use app::MusiciansApp;
pub use config::{ConfigError, MusiciansConfig};
pub use model::Musician;
pub use service::MusiciansService;
pub use state::MusiciansState;
