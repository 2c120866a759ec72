//! Protocol configuration.
//!
//! Parameters every ledger instance and every operator must agree on.
//! Defaults suit local simulation. Override via `VEIL_*` environment
//! variables, a YAML document, or explicit construction.

use serde::{Deserialize, Serialize};

use crate::identity::{Address, DomainId};

/// Ledger-wide protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Minimum age of a swap batch before it may be finalized.
    pub batch_interval_secs: u64,
    /// Number of operators drawn per batch.
    pub committee_size: usize,
    /// Distinct committee signatures required to accept a settlement.
    pub min_attestations: usize,
    /// Window after finalization in which a settlement must arrive.
    pub max_response_interval_secs: u64,
    /// Quiet period after the last UEI submission before finalization.
    pub uei_idle_timeout_secs: u64,
    /// Principal allowed to force early finalization.
    pub admin: Address,
    /// Execution domain of the committee; other domains go through the relay.
    pub local_domain: DomainId,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            batch_interval_secs: 30,
            committee_size: 3,
            min_attestations: 2,
            max_response_interval_secs: 300,
            uei_idle_timeout_secs: 15,
            admin: Address([0u8; 20]),
            local_domain: DomainId(1),
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from environment variables, falling back to
    /// [`Default`] for anything unset.
    ///
    /// Variables:
    /// - `VEIL_BATCH_INTERVAL_SECS` (default: 30)
    /// - `VEIL_COMMITTEE_SIZE` (default: 3)
    /// - `VEIL_MIN_ATTESTATIONS` (default: 2)
    /// - `VEIL_MAX_RESPONSE_INTERVAL_SECS` (default: 300)
    /// - `VEIL_UEI_IDLE_TIMEOUT_SECS` (default: 15)
    /// - `VEIL_ADMIN` (default: zero address)
    /// - `VEIL_LOCAL_DOMAIN` (default: 1)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let admin = match std::env::var("VEIL_ADMIN") {
            Ok(raw) => Address::from_hex(&raw).map_err(|reason| ConfigError::Invalid {
                var: "VEIL_ADMIN".to_string(),
                reason,
            })?,
            Err(_) => defaults.admin,
        };
        let config = Self {
            batch_interval_secs: env_parse("VEIL_BATCH_INTERVAL_SECS", defaults.batch_interval_secs)?,
            committee_size: env_parse("VEIL_COMMITTEE_SIZE", defaults.committee_size)?,
            min_attestations: env_parse("VEIL_MIN_ATTESTATIONS", defaults.min_attestations)?,
            max_response_interval_secs: env_parse(
                "VEIL_MAX_RESPONSE_INTERVAL_SECS",
                defaults.max_response_interval_secs,
            )?,
            uei_idle_timeout_secs: env_parse(
                "VEIL_UEI_IDLE_TIMEOUT_SECS",
                defaults.uei_idle_timeout_secs,
            )?,
            admin,
            local_domain: DomainId(env_parse("VEIL_LOCAL_DOMAIN", defaults.local_domain.0)?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.committee_size == 0 {
            return Err(ConfigError::Inconsistent(
                "committee_size must be at least 1".to_string(),
            ));
        }
        if self.min_attestations == 0 {
            return Err(ConfigError::Inconsistent(
                "min_attestations must be at least 1".to_string(),
            ));
        }
        if self.min_attestations > self.committee_size {
            return Err(ConfigError::Inconsistent(format!(
                "min_attestations ({}) exceeds committee_size ({})",
                self.min_attestations, self.committee_size
            )));
        }
        if self.max_response_interval_secs == 0 {
            return Err(ConfigError::Inconsistent(
                "max_response_interval_secs must be positive".to_string(),
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

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: String,
        /// Parser message.
        reason: String,
    },
    /// A configuration document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Fields are individually valid but contradict each other.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}
