//! Translating operation outcomes into actions.
//!
//! An effect that performs an asynchronous operation must never let a
//! failure escape as an error: the effect would stop reacting to later
//! triggers. Instead the outcome is folded into exactly one value, usually a
//! success action or a failure action carrying a human-readable message.
//!
//! # Example
//!
//! ```ignore
//! let action = map_response(
//!     with_timeout(Some(Duration::from_secs(5)), api.fetch_all()),
//!     |items| ItemsAction::Loaded { items },
//!     |error| ItemsAction::LoadFailed { message: error.to_string() },
//! )
//! .await;
//! ```

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Expected failures of an asynchronous operation
///
/// The `Display` output is the human-readable message that ends up in
/// failure actions and, from there, in application state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The operation reported a failure
    #[error("{0}")]
    Failed(String),

    /// The operation did not settle within its deadline
    #[error("Operation timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl OperationError {
    /// Shorthand for [`OperationError::Failed`]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A pair of continuations that fold a `Result` into one value
///
/// # Example
///
/// ```ignore
/// let mapper = ResponseMapper::new(
///     |items: Vec<Item>| Action::Loaded { items },
///     |error: OperationError| Action::Failed { message: error.to_string() },
/// );
/// let action = mapper.resolve(api.fetch_all()).await;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ResponseMapper<S, F> {
    on_success: S,
    on_failure: F,
}

impl<S, F> ResponseMapper<S, F> {
    /// Create a mapper from its success and failure continuations
    pub const fn new(on_success: S, on_failure: F) -> Self {
        Self {
            on_success,
            on_failure,
        }
    }

    /// Fold an already settled outcome
    pub fn map<T, E, R>(self, outcome: Result<T, E>) -> R
    where
        S: FnOnce(T) -> R,
        F: FnOnce(E) -> R,
    {
        match outcome {
            Ok(value) => (self.on_success)(value),
            Err(error) => (self.on_failure)(error),
        }
    }

    /// Await an operation and fold its outcome
    pub async fn resolve<Fut, T, E, R>(self, operation: Fut) -> R
    where
        Fut: Future<Output = Result<T, E>>,
        S: FnOnce(T) -> R,
        F: FnOnce(E) -> R,
    {
        self.map(operation.await)
    }
}

/// Await an operation and fold its outcome into exactly one value
///
/// `on_success` runs for `Ok`, `on_failure` for `Err`; the returned future
/// never fails.
pub async fn map_response<Fut, T, E, R, S, F>(operation: Fut, on_success: S, on_failure: F) -> R
where
    Fut: Future<Output = Result<T, E>>,
    S: FnOnce(T) -> R,
    F: FnOnce(E) -> R,
{
    ResponseMapper::new(on_success, on_failure)
        .resolve(operation)
        .await
}

/// Bound an operation by an optional deadline
///
/// With `Some(duration)`, an operation that has not settled in time is
/// dropped and reported as [`OperationError::TimedOut`], so it flows through
/// the same failure path as any other [`OperationError`]. With `None` the
/// operation runs unbounded.
pub async fn with_timeout<Fut, T>(deadline: Option<Duration>, operation: Fut) -> Result<T, OperationError>
where
    Fut: Future<Output = Result<T, OperationError>>,
{
    match deadline {
        Some(duration) => tokio::time::timeout(duration, operation)
            .await
            .unwrap_or(Err(OperationError::TimedOut(duration))),
        None => operation.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Loaded(usize),
        Failed(String),
    }

    #[tokio::test]
    async fn test_success_maps_through_on_success() {
        let outcome = map_response(
            async { Ok::<_, OperationError>(vec![1, 2, 3]) },
            |items| Outcome::Loaded(items.len()),
            |error| Outcome::Failed(error.to_string()),
        )
        .await;
        assert_eq!(outcome, Outcome::Loaded(3));
    }

    #[tokio::test]
    async fn test_failure_maps_through_on_failure() {
        let outcome = map_response(
            async { Err::<Vec<u32>, _>(OperationError::failed("backend unavailable")) },
            |items| Outcome::Loaded(items.len()),
            |error| Outcome::Failed(error.to_string()),
        )
        .await;
        assert_eq!(outcome, Outcome::Failed("backend unavailable".to_string()));
    }

    #[test]
    fn test_mapper_folds_settled_outcomes() {
        let ok = ResponseMapper::new(|n: usize| n * 2, |_e: String| 0).map(Ok(21));
        let err = ResponseMapper::new(|n: usize| n * 2, |_e: String| 0).map(Err("boom".to_string()));
        assert_eq!(ok, 42);
        assert_eq!(err, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_operation_failure() {
        let result = with_timeout(Some(Duration::from_millis(50)), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, OperationError>(1)
        })
        .await;

        assert_eq!(result, Err(OperationError::TimedOut(Duration::from_millis(50))));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Operation timed out after 50ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_within_deadline_passes_through() {
        let result = with_timeout(Some(Duration::from_secs(1)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, OperationError>("done")
        })
        .await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn test_no_deadline_runs_unbounded() {
        let result = with_timeout(None, async { Err::<(), _>(OperationError::failed("nope")) }).await;
        assert_eq!(result, Err(OperationError::failed("nope")));
    }
}
