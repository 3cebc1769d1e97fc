//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scoring configuration
    pub detector: DetectorConfig,
    /// Ingestion and batching configuration
    pub batch: BatchConfig,
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Samples retained per endpoint
    pub history_capacity: usize,
    /// Live per-service store TTL, measured from an endpoint's last sample
    #[serde(with = "humantime_serde")]
    pub live_ttl: Duration,
    /// TTL of published snapshot stores
    #[serde(with = "humantime_serde")]
    pub snapshot_ttl: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            live_ttl: Duration::from_secs(60),
            snapshot_ttl: Duration::from_secs(24 * 365 * 3600),
        }
    }
}

/// Ingestion and batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pending samples of one service are dispatched once this many are queued
    pub max_batch_size: usize,
    /// Pending samples are dispatched at least this often
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Bounded ingestion channel size; producers wait when it is full
    pub queue_capacity: usize,
    /// Number of batch workers. The live store has a single owner, so only 1 is valid.
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval: Duration::from_millis(100),
            queue_capacity: 1024,
            workers: 1,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (FAILURE_DETECTOR_ prefix)
        figment = figment.merge(Env::prefixed("FAILURE_DETECTOR_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.detector.history_capacity == 0 {
            return Err(Error::Config(
                "detector.history_capacity must be greater than 0".to_string(),
            ));
        }
        if self.detector.live_ttl.is_zero() {
            return Err(Error::Config(
                "detector.live_ttl must be greater than 0".to_string(),
            ));
        }
        if self.detector.snapshot_ttl.is_zero() {
            return Err(Error::Config(
                "detector.snapshot_ttl must be greater than 0".to_string(),
            ));
        }
        if self.batch.max_batch_size == 0 {
            return Err(Error::Config(
                "batch.max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch.queue_capacity == 0 {
            return Err(Error::Config(
                "batch.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.batch.flush_interval.is_zero() {
            return Err(Error::Config(
                "batch.flush_interval must be greater than 0".to_string(),
            ));
        }
        if self.batch.workers != 1 {
            return Err(Error::UnsupportedWorkerCount(self.batch.workers));
        }
        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "2h", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            scaled_secs(mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            scaled_secs(hours, 3600)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }

    fn scaled_secs<E: serde::de::Error>(value: &str, unit_secs: u64) -> Result<Duration, E> {
        let value = value.parse::<u64>().map_err(E::custom)?;
        value
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| E::custom(format!("duration overflow: {value} x {unit_secs}s")))
    }
}
