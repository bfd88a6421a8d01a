//! Runtime configuration for the pipeline daemon.
//!
//! Values are layered: built-in defaults, then an optional file named by
//! `TASKRELAY_CONFIG`, then `TASKRELAY__`-prefixed environment variables
//! with `__` separating nested keys (`TASKRELAY__DELIVERY__MAX_ATTEMPTS=5`).

use crate::queue::domain::DeliveryPolicy;
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional configuration file.
pub const CONFIG_PATH_ENV: &str = "TASKRELAY_CONFIG";

const ENV_PREFIX: &str = "TASKRELAY";
const ENV_SEPARATOR: &str = "__";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not deserialize.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    /// A value is out of range.
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Retry settings for queued deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Attempts per event before it is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per attempt.
    pub initial_backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DeliveryPolicy::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: 1000,
        }
    }
}

/// Settings for the relay, the sweeper, and the workers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Competing consumers to run.
    pub worker_count: usize,
    /// Pause between outbox relay passes, in milliseconds.
    pub relay_interval_ms: u64,
    /// Outbox entries published per relay pass.
    pub relay_batch_size: usize,
    /// Pause between overdue sweeps, in seconds.
    pub sweep_interval_secs: u64,
    /// Pause between polls of an empty queue, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a leased delivery stays hidden from other consumers, in
    /// seconds.
    pub lease_timeout_secs: u64,
    /// Retry settings.
    pub delivery: DeliveryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/taskrelay".to_owned(),
            pool_size: 8,
            worker_count: 2,
            relay_interval_ms: 500,
            relay_batch_size: 100,
            sweep_interval_secs: 3600,
            poll_interval_ms: 250,
            lease_timeout_secs: 30,
            delivery: DeliveryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates configuration from the file named by
    /// [`CONFIG_PATH_ENV`] (if set) and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source is malformed or a value is out
    /// of range.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }
        let loaded: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parses and validates TOML, filling unset keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is malformed or a value is out
    /// of range.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let parsed: Self = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks that every count and interval is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("database_url", self.database_url.is_empty()),
            ("pool_size", self.pool_size == 0),
            ("worker_count", self.worker_count == 0),
            ("relay_interval_ms", self.relay_interval_ms == 0),
            ("relay_batch_size", self.relay_batch_size == 0),
            ("sweep_interval_secs", self.sweep_interval_secs == 0),
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("lease_timeout_secs", self.lease_timeout_secs == 0),
            ("delivery.max_attempts", self.delivery.max_attempts == 0),
        ];
        checks
            .into_iter()
            .find(|&(_, rejected)| rejected)
            .map_or(Ok(()), |(field, _)| {
                Err(ConfigError::Invalid {
                    field,
                    reason: "must not be zero or empty",
                })
            })
    }

    /// Returns the pause between relay passes.
    #[must_use]
    pub const fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }

    /// Returns the pause between overdue sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Returns the pause between polls of an empty queue.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns how long a lease hides a delivery.
    #[must_use]
    pub const fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    /// Returns the delivery policy described by [`Self::delivery`].
    #[must_use]
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::exponential(
            self.delivery.max_attempts,
            Duration::from_millis(self.delivery.initial_backoff_ms),
        )
    }
}
