//! Operator node configuration.

use serde::{Deserialize, Serialize};
use veil_core::ConfigError;

/// Per-node tuning. Protocol parameters come from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// How often the worker polls for finalized batches.
    pub poll_interval_ms: u64,
    /// Handles per decrypt round-trip. Capped at the compute service's own
    /// per-call limit.
    pub decrypt_chunk_size: usize,
    /// Tries per batch before a worker gives up on it.
    pub max_batch_attempts: u32,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            decrypt_chunk_size: 16,
            max_batch_attempts: 5,
        }
    }
}

impl OperatorConfig {
    /// Load from the environment, falling back to [`Default`].
    ///
    /// Variables:
    /// - `VEIL_OPERATOR_POLL_INTERVAL_MS` (default: 200)
    /// - `VEIL_OPERATOR_DECRYPT_CHUNK_SIZE` (default: 16)
    /// - `VEIL_OPERATOR_MAX_BATCH_ATTEMPTS` (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            poll_interval_ms: env_parse("VEIL_OPERATOR_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            decrypt_chunk_size: env_parse(
                "VEIL_OPERATOR_DECRYPT_CHUNK_SIZE",
                defaults.decrypt_chunk_size,
            )?,
            max_batch_attempts: env_parse(
                "VEIL_OPERATOR_MAX_BATCH_ATTEMPTS",
                defaults.max_batch_attempts,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Inconsistent(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.decrypt_chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "decrypt_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.max_batch_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "max_batch_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
