//! # Composable Effects Core
//!
//! Core traits and types for the composable effects architecture.
//!
//! This crate provides the vocabulary shared by every other crate in the
//! workspace: what an action is, how an effect is described, and how the
//! outcome of an asynchronous operation is folded back into an action.
//! Nothing in here executes anything; execution lives in the runtime crate.
//!
//! ## Core Concepts
//!
//! - **Action**: An immutable, typed description of something that happened
//! - **Effect**: A named, reactive description `actions → follow-up actions`
//! - **Pipeline**: The body of an effect (filter + synchronous or asynchronous stage)
//! - **Concurrency**: How an asynchronous stage treats triggers that arrive while busy
//! - **Environment**: Injected capabilities (clock, data sources)
//!
//! ## Architecture Principles
//!
//! - Effects are descriptions, the runner executes them
//! - Operation failures are values, never stream terminations
//! - Unidirectional data flow: actions in, actions and state updates out
//!
//! ## Example
//!
//! ```ignore
//! use composable_effects_core::{Action, Effect, EffectConfig, map_response};
//!
//! #[derive(Action, Clone, Debug)]
//! enum TodoAction {
//!     #[kind = "todos/page/opened"]
//!     PageOpened,
//!     #[kind = "todos/api/loaded"]
//!     Loaded { titles: Vec<String> },
//!     #[kind = "todos/api/failed"]
//!     Failed { message: String },
//! }
//!
//! let load = Effect::create(EffectConfig::new("load-todos"), |actions| {
//!     actions
//!         .of_kind(&[TodoAction::PAGE_OPENED])
//!         .exhaust_map(move |_| async move {
//!             Some(map_response(
//!                 api.fetch_all(),
//!                 |titles| TodoAction::Loaded { titles },
//!                 |error| TodoAction::Failed { message: error.to_string() },
//!             ).await)
//!         })
//! });
//! ```

// Lets `#[derive(Action)]` resolve `::composable_effects_core` inside this crate's own tests.
extern crate self as composable_effects_core;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Action trait, kind filters and the derive macro
pub mod action;

/// Effect descriptions: configuration, pipelines and concurrency policies
pub mod effect;

/// Translating operation outcomes into actions
pub mod response;

pub use action::{Action, KindFilter};
pub use composable_effects_macros::Action;
pub use effect::{
    Actions, AsyncProject, Concurrency, Effect, EffectConfig, EffectError, Pipeline, Stage,
    SyncProject,
};
pub use environment::{Clock, DataSource, SystemClock};
pub use response::{OperationError, ResponseMapper, map_response, with_timeout};

/// Environment module - Dependency injection traits
///
/// All external capabilities an effect needs are abstracted behind traits
/// and captured by the effect's factory closure. Production code injects
/// real implementations; tests inject the mocks from the testing crate.
pub mod environment {
    use crate::response::OperationError;
    use chrono::{DateTime, Utc};
    use futures::future::BoxFuture;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = composable_effects_testing::test_clock();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock implementation of [`Clock`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// An asynchronous source of items (a backend API, a mock service, ...)
    ///
    /// # Contract
    ///
    /// - Every call to [`fetch_all`](DataSource::fetch_all) settles exactly once,
    ///   with either the ordered items or an [`OperationError`]
    /// - Dropping the returned future cancels the operation; an implementation
    ///   must tolerate being dropped at any await point
    /// - The delay before settling is implementation-defined
    ///
    /// # Dyn Compatibility
    ///
    /// Returns a boxed future instead of using `async fn` so the trait can be
    /// used as `Arc<dyn DataSource<T>>` inside effect closures.
    pub trait DataSource<T>: Send + Sync {
        /// Fetch every item the source knows about
        fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<T>, OperationError>>;
    }
}
