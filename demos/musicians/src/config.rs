//! Configuration for the musicians demo.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is honoured by the binary.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value found
        value: String,
        /// What was expected
        reason: &'static str,
    },
}

/// Demo configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusiciansConfig {
    /// Mock backend delay in milliseconds (`MUSICIANS_LOAD_DELAY_MS`, default 1000)
    pub load_delay_ms: u64,
    /// Load timeout in milliseconds (`MUSICIANS_LOAD_TIMEOUT_MS`, unset means none)
    pub load_timeout_ms: Option<u64>,
    /// Trigger buffer per asynchronous effect (`MUSICIANS_EFFECT_BUFFER`, default 64)
    pub effect_buffer: usize,
    /// Install the Prometheus recorder (`MUSICIANS_METRICS`, default false)
    pub metrics: bool,
}

impl Default for MusiciansConfig {
    fn default() -> Self {
        Self {
            load_delay_ms: 1000,
            load_timeout_ms: None,
            effect_buffer: 64,
            metrics: false,
        }
    }
}

impl MusiciansConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value that
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value that
    /// cannot be parsed.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            load_delay_ms: parse_number(&lookup, "MUSICIANS_LOAD_DELAY_MS")?
                .unwrap_or(defaults.load_delay_ms),
            load_timeout_ms: parse_number(&lookup, "MUSICIANS_LOAD_TIMEOUT_MS")?,
            effect_buffer: match parse_number::<usize, _>(&lookup, "MUSICIANS_EFFECT_BUFFER")? {
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        key: "MUSICIANS_EFFECT_BUFFER",
                        value: "0".to_string(),
                        reason: "must be at least 1",
                    });
                }
                Some(buffer) => buffer,
                None => defaults.effect_buffer,
            },
            metrics: parse_flag(&lookup, "MUSICIANS_METRICS")?.unwrap_or(defaults.metrics),
        })
    }

    /// Mock backend delay
    #[must_use]
    pub const fn load_delay(&self) -> Duration {
        Duration::from_millis(self.load_delay_ms)
    }

    /// Load timeout, if any
    #[must_use]
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_number<T, L>(lookup: &L, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Invalid {
                key,
                value,
                reason: "expected a non-negative integer",
            })
        })
        .transpose()
}

fn parse_flag<L>(lookup: &L, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value,
                    reason: "expected true or false",
                }),
            }
        })
        .transpose()
}
