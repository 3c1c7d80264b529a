//! Oracle queue snapshots and wait estimates.

use serde::{Deserialize, Serialize};

use super::account::OracleAccount;

/// What the account loader reports for an oracle account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAccountInfo {
    /// Queue the account is assigned to
    pub queue: String,
    /// Provider status string (e.g. "active", "paused")
    pub status: String,
    pub is_active: bool,
}

/// Point-in-time view of an oracle queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: String,
    /// Pending requests
    pub size: u64,
    /// Maximum pending requests
    pub capacity: u64,
    /// Provider-reported service time per position, if any
    pub avg_time_per_position_ms: Option<u64>,
}

impl QueueSnapshot {
    /// Fraction of capacity in use, 1.0 when capacity is unknown/zero.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        (self.size as f64 / self.capacity as f64).min(1.0)
    }

    pub fn health(&self) -> QueueHealth {
        QueueHealth::from_utilization(self.utilization())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueHealth {
    Healthy,
    Degraded,
    Critical,
}

impl std::fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

impl QueueHealth {
    pub fn from_utilization(utilization: f64) -> Self {
        match utilization {
            u if u <= 0.7 => Self::Healthy,
            u if u <= 0.9 => Self::Degraded,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateConfidence {
    Low,
    Medium,
    High,
}

/// Advisory wait estimate for an account's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEstimate {
    pub account: String,
    pub queue: Option<String>,
    /// 0 when unknown (inactive account)
    pub position: u64,
    pub queue_size: u64,
    pub utilization: f64,
    pub estimated_wait_ms: u64,
    pub confidence: EstimateConfidence,
}

/// Winner of `find_best_queue` with a human-readable justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecommendation {
    pub account: OracleAccount,
    pub queue: String,
    pub score: f64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_and_health() {
        let mut snapshot =
            QueueSnapshot { queue: "q".into(), size: 35, capacity: 50, avg_time_per_position_ms: None };
        assert!((snapshot.utilization() - 0.7).abs() < f64::EPSILON);
        assert_eq!(snapshot.health(), QueueHealth::Healthy);

        snapshot.size = 45;
        assert_eq!(snapshot.health(), QueueHealth::Degraded);

        snapshot.capacity = 0;
        assert_eq!(snapshot.health(), QueueHealth::Critical);
    }
}
