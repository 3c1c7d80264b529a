//! Oracle accounts and their live health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Opaque key of an oracle account (e.g. a base58 public key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountIdentity(pub String);

impl AccountIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A configured randomness-provider account. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAccount {
    pub identity: AccountIdentity,
    /// Unique human-readable name, used as the key everywhere else
    pub name: String,
    /// Lower is preferred
    pub priority: i32,
}

impl OracleAccount {
    pub fn new(identity: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self { identity: AccountIdentity::new(identity), name: name.into(), priority }
    }
}

/// Process-wide thresholds that decide whether an account is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthThresholds {
    /// Maximum pending requests ahead of us
    #[validate(range(min = 1_u64))]
    pub max_queue_depth: u64,
    /// Maximum average response time in milliseconds
    #[validate(range(min = 1.0))]
    pub max_response_time_ms: f64,
    /// Minimum success rate in [0, 1]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_success_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self { max_queue_depth: 50, max_response_time_ms: 5000.0, min_success_rate: 0.7 }
    }
}

/// Live health of one account. `is_healthy` is derived from the other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountHealth {
    pub is_healthy: bool,
    pub queue_depth: u64,
    pub avg_response_time_ms: f64,
    pub success_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for AccountHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            queue_depth: 0,
            avg_response_time_ms: 0.0,
            success_rate: 1.0,
            last_updated: Utc::now(),
        }
    }
}

impl AccountHealth {
    /// Whether the raw metrics satisfy the thresholds.
    pub fn meets(&self, thresholds: &HealthThresholds) -> bool {
        self.queue_depth <= thresholds.max_queue_depth
            && self.avg_response_time_ms <= thresholds.max_response_time_ms
            && self.success_rate >= thresholds.min_success_rate
    }

    /// Merge a partial observation, re-derive `is_healthy` and stamp the time.
    pub fn apply(&mut self, update: &HealthUpdate, thresholds: &HealthThresholds) {
        if let Some(depth) = update.queue_depth {
            self.queue_depth = depth;
        }
        if let Some(ms) = update.avg_response_time_ms.filter(|ms| ms.is_finite()) {
            self.avg_response_time_ms = ms.max(0.0);
        }
        if let Some(rate) = update.success_rate.filter(|rate| rate.is_finite()) {
            self.success_rate = rate.clamp(0.0, 1.0);
        }
        self.is_healthy = self.meets(thresholds);
        self.last_updated = Utc::now();
    }
}

/// Partial health observation; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub queue_depth: Option<u64>,
    pub avg_response_time_ms: Option<f64>,
    pub success_rate: Option<f64>,
}

impl HealthUpdate {
    pub fn queue_depth(depth: u64) -> Self {
        Self { queue_depth: Some(depth), ..Self::default() }
    }

    pub fn response_time(ms: f64) -> Self {
        Self { avg_response_time_ms: Some(ms), ..Self::default() }
    }

    pub fn success_rate(rate: f64) -> Self {
        Self { success_rate: Some(rate), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_recomputes_health() {
        let thresholds = HealthThresholds::default();
        let mut health = AccountHealth::default();
        assert!(health.is_healthy);

        health.apply(&HealthUpdate::queue_depth(51), &thresholds);
        assert!(!health.is_healthy);

        health.apply(&HealthUpdate::queue_depth(50), &thresholds);
        assert!(health.is_healthy);

        health.apply(&HealthUpdate::success_rate(0.69), &thresholds);
        assert!(!health.is_healthy);
    }

    #[test]
    fn test_apply_clamps_values() {
        let thresholds = HealthThresholds::default();
        let mut health = AccountHealth::default();
        health.apply(
            &HealthUpdate {
                queue_depth: None,
                avg_response_time_ms: Some(-5.0),
                success_rate: Some(1.7),
            },
            &thresholds,
        );
        assert_eq!(health.avg_response_time_ms, 0.0);
        assert_eq!(health.success_rate, 1.0);
    }
}
