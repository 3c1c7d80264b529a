//! Resilience configuration.
//!
//! Every knob has a default; a missing config file yields
//! [`ResilienceConfig::default`]. Per-call overrides live in the core crate.

mod emergency;
mod retry;
mod runtime;

pub use emergency::EmergencyConfig;
pub use retry::{RetryConfig, SelectionStrategy};
pub use runtime::{LeaderConfig, ProbeConfig, QueueConfig, StatusConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use super::account::{HealthThresholds, OracleAccount};
use crate::error::ConfigError;

/// One oracle account as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OracleAccountConfig {
    #[validate(length(min = 1_u64))]
    pub identity: String,
    #[validate(length(min = 1_u64))]
    pub name: String,
    #[serde(default)]
    pub priority: i32,
}

impl From<&OracleAccountConfig> for OracleAccount {
    fn from(cfg: &OracleAccountConfig) -> Self {
        OracleAccount::new(cfg.identity.clone(), cfg.name.clone(), cfg.priority)
    }
}

/// Full resilience-layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
#[validate(schema(function = "validate_unique_account_names"))]
pub struct ResilienceConfig {
    #[validate(nested)]
    pub retry: RetryConfig,
    #[validate(nested)]
    pub emergency: EmergencyConfig,
    #[validate(nested)]
    pub health: HealthThresholds,
    #[validate(nested)]
    pub status: StatusConfig,
    #[validate(nested)]
    pub queue: QueueConfig,
    #[validate(nested)]
    pub leader: LeaderConfig,
    #[validate(nested)]
    pub probe: ProbeConfig,
    #[validate(nested)]
    pub accounts: Vec<OracleAccountConfig>,
}

fn validate_unique_account_names(config: &ResilienceConfig) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for account in &config.accounts {
        if !seen.insert(account.name.as_str()) {
            return Err(ValidationError::new("duplicate_account_name"));
        }
    }
    Ok(())
}

impl ResilienceConfig {
    pub fn oracle_accounts(&self) -> Vec<OracleAccount> {
        self.accounts.iter().map(OracleAccount::from).collect()
    }

    /// Run field validation and map failures to [`ConfigError::Invalid`].
    pub fn validate_fields(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Invalid { message: e.to_string() })
    }

    /// Nominal worst-case time one orchestrator run may take: every attempt
    /// hits its timeout and every retry waits the jittered-up base backoff.
    pub fn retry_budget_ms(&self) -> u64 {
        self.retry.worst_case_budget_ms()
    }

    /// Strict check that the emergency window outlasts the retry budget.
    pub fn check_budget(&self) -> Result<(), ConfigError> {
        let budget_ms = self.retry_budget_ms();
        if self.emergency.timeout_ms <= budget_ms {
            return Err(ConfigError::EmergencyWindowTooShort {
                emergency_ms: self.emergency.timeout_ms,
                budget_ms,
            });
        }
        Ok(())
    }
}
