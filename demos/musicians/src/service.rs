//! Mock musicians backend.
//!
//! Serves a JSON fixture after a configurable delay. Records are validated
//! one by one: an invalid record is skipped with a warning and the rest of
//! the batch is still returned. A forced failure fails the whole call.

use crate::model::Musician;
use composable_effects_core::environment::DataSource;
use composable_effects_core::response::OperationError;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// The bundled fixture
pub const FIXTURE: &str = include_str!("../data/musicians.json");

/// Why a single fixture record was rejected
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record is not an object with the expected fields
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The id is missing or not a non-negative integer
    #[error("Invalid id: {0}")]
    InvalidId(serde_json::Value),

    /// The name is empty or the literal `"null"`
    #[error("Musician {id} has no name")]
    MissingName {
        /// Id of the rejected record
        id: u32,
    },
}

/// A fixture record before validation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMusician {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl TryFrom<RawMusician> for Musician {
    type Error = RecordError;

    fn try_from(raw: RawMusician) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| RecordError::InvalidId(raw.id.clone()))?;

        let name = raw
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && name != "null")
            .ok_or(RecordError::MissingName { id })?;

        Ok(Self {
            id,
            name,
            photo_url: raw.photo_url.unwrap_or_default(),
        })
    }
}

/// Parse a fixture, keeping every valid record in order
///
/// # Errors
///
/// Returns [`OperationError::Failed`] if the document is not a JSON array.
/// Invalid records inside the array are skipped, not reported.
pub fn parse_musicians(json: &str) -> Result<Vec<Musician>, OperationError> {
    let records: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| OperationError::failed(format!("Malformed musicians payload: {e}")))?;

    let total = records.len();
    let musicians: Vec<Musician> = records
        .into_iter()
        .filter_map(|record| {
            match serde_json::from_value::<RawMusician>(record)
                .map_err(RecordError::from)
                .and_then(Musician::try_from)
            {
                Ok(musician) => Some(musician),
                Err(error) => {
                    tracing::warn!(%error, "Skipping invalid musician record");
                    metrics::counter!("musicians_records_skipped_total").increment(1);
                    None
                }
            }
        })
        .collect();

    tracing::debug!(total, kept = musicians.len(), "Musicians parsed");
    Ok(musicians)
}

/// Mock backend serving musicians from a JSON document
#[derive(Debug)]
pub struct MusiciansService {
    payload: String,
    delay: Duration,
    forced_failure: Mutex<Option<String>>,
}

impl MusiciansService {
    /// Serve the bundled fixture after `delay`
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self::with_payload(FIXTURE, delay)
    }

    /// Serve an arbitrary JSON document after `delay`
    #[must_use]
    pub fn with_payload(payload: impl Into<String>, delay: Duration) -> Self {
        Self {
            payload: payload.into(),
            delay,
            forced_failure: Mutex::new(None),
        }
    }

    /// Fail every later call with `message`, or stop failing with `None`
    pub fn force_failure(&self, message: Option<String>) {
        *self
            .forced_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = message;
    }

    /// The configured delay
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for MusiciansService {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl DataSource<Musician> for MusiciansService {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<Musician>, OperationError>> {
        Box::pin(async move {
            tracing::debug!(delay_ms = self.delay.as_millis(), "Fetching musicians");
            tokio::time::sleep(self.delay).await;

            let forced = self
                .forced_failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(message) = forced {
                return Err(OperationError::Failed(message));
            }

            parse_musicians(&self.payload)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_fixture_drops_invalid_record() {
        let musicians = parse_musicians(FIXTURE).unwrap();
        let ids: Vec<u32> = musicians.iter().map(|m| m.id).collect();

        assert_eq!(ids, vec![1, 2, 3, 4, 6, 7]);
        assert!(musicians.iter().all(|m| m.name != "null"));
    }

    #[test]
    fn test_each_rule_drops_only_its_record() {
        let json = r#"[
            { "id": 1, "name": "Kept", "photoUrl": "/a.jpg" },
            { "id": "two", "name": "Bad id" },
            { "id": -3, "name": "Negative id" },
            { "id": 4, "name": "   " },
            { "id": 5 },
            "not an object",
            { "id": 6, "name": "Also kept" }
        ]"#;

        let names: Vec<String> = parse_musicians(json).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Kept", "Also kept"]);
    }

    #[test]
    fn test_non_array_payload_fails_the_call() {
        let error = parse_musicians(r#"{"id": 1}"#).unwrap_err();
        assert!(error.to_string().starts_with("Malformed musicians payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_waits_for_delay() {
        let service = MusiciansService::new(Duration::from_millis(1000));
        let started = tokio::time::Instant::now();

        let musicians = service.fetch_all().await.unwrap();

        assert_eq!(musicians.len(), 6);
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_failure_fails_whole_call() {
        let service = MusiciansService::new(Duration::ZERO);
        service.force_failure(Some("Backend unavailable".into()));
        assert_eq!(
            service.fetch_all().await,
            Err(OperationError::failed("Backend unavailable"))
        );

        service.force_failure(None);
        assert!(service.fetch_all().await.is_ok());
    }
}
