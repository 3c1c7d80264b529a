//! Status tracking, queue estimation, leader election and probe settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StatusConfig {
    /// Entries kept per round for diagnostics
    #[validate(range(min = 1_usize, max = 1000_usize))]
    pub history_limit: usize,
    /// Delay before a terminal round is dropped from the active view
    pub cleanup_grace_ms: u64,
    /// Delay before a terminal round's history is dropped
    pub history_retention_ms: u64,
    /// Age after which an active round counts as slow
    pub slow_round_threshold_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            cleanup_grace_ms: 5000,
            history_retention_ms: 60_000,
            slow_round_threshold_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueueConfig {
    pub cache_ttl_ms: u64,
    /// Fallback service time per queue position
    #[validate(range(min = 1_u64))]
    pub avg_time_per_position_ms: u64,
    #[validate(range(min = 1_usize))]
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { cache_ttl_ms: 30_000, avg_time_per_position_ms: 2000, history_limit: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_heartbeat_window"))]
pub struct LeaderConfig {
    #[validate(range(min = 10_u64))]
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

fn validate_heartbeat_window(config: &LeaderConfig) -> Result<(), validator::ValidationError> {
    if config.heartbeat_timeout_ms <= config.heartbeat_interval_ms {
        return Err(validator::ValidationError::new("heartbeat_timeout_too_short"));
    }
    Ok(())
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self { heartbeat_interval_ms: 2000, heartbeat_timeout_ms: 6000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    #[validate(range(min = 100_u64))]
    pub interval_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { enabled: true, interval_ms: 15_000 }
    }
}
