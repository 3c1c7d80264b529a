//! Scoring and ranking helpers for account selection.

use std::cmp::Ordering;
use vrfguard_types::{AccountHealth, HealthThresholds, OracleAccount};

const QUEUE_WEIGHT: f64 = 0.4;
const RESPONSE_TIME_WEIGHT: f64 = 0.4;
const FAILURE_WEIGHT: f64 = 0.2;

/// Lower is better. Each term is normalised against its threshold and
/// clamped to [0, 1].
pub fn health_score(health: &AccountHealth, thresholds: &HealthThresholds) -> f64 {
    let queue = (health.queue_depth as f64 / thresholds.max_queue_depth.max(1) as f64).clamp(0.0, 1.0);
    let response =
        (health.avg_response_time_ms / thresholds.max_response_time_ms.max(1.0)).clamp(0.0, 1.0);
    let failure = (1.0 - health.success_rate).clamp(0.0, 1.0);
    QUEUE_WEIGHT * queue + RESPONSE_TIME_WEIGHT * response + FAILURE_WEIGHT * failure
}

/// Score ascending, then priority ascending.
pub fn by_score(a: &(OracleAccount, f64), b: &(OracleAccount, f64)) -> Ordering {
    a.1.partial_cmp(&b.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.priority.cmp(&b.0.priority))
}

/// Success rate descending, response time ascending, priority ascending.
pub fn backup_order(a: &(OracleAccount, AccountHealth), b: &(OracleAccount, AccountHealth)) -> Ordering {
    b.1.success_rate
        .partial_cmp(&a.1.success_rate)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.1.avg_response_time_ms
                .partial_cmp(&b.1.avg_response_time_ms)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.0.priority.cmp(&b.0.priority))
}
