//! Metrics emitted by the resilience layer.
//!
//! Recorded through the `metrics` facade, so they are no-ops until a
//! recorder is installed. [`init_metrics`] installs the Prometheus one:
//! - `vrfguard_attempts_total{account,outcome}` - Orchestrator attempts
//! - `vrfguard_attempt_duration_seconds{account}` - Attempt latency
//! - `vrfguard_quarantines_total{account,error_type}` - Accounts quarantined
//! - `vrfguard_emergency_resolutions_total{method}` - Watchdog resolutions
//! - `vrfguard_leadership_changes_total{role}` - Election transitions
//! - `vrfguard_accounts_healthy` - Healthy, non-quarantined accounts

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{AppError, AppResult};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Oracle round trips range from sub-second to the per-attempt timeout.
const ATTEMPT_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0];

/// Install the Prometheus recorder once and return its handle.
pub fn init_metrics() -> AppResult<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(ATTEMPT_LATENCY_BUCKETS)
        .and_then(PrometheusBuilder::install_recorder)
        .map_err(|e| AppError::Unknown(format!("failed to install metrics recorder: {e}")))?;

    describe_counter!("vrfguard_attempts_total", "Oracle attempts by account and outcome");
    describe_histogram!("vrfguard_attempt_duration_seconds", "Oracle attempt latency in seconds");
    describe_counter!("vrfguard_quarantines_total", "Accounts placed in quarantine");
    describe_counter!(
        "vrfguard_emergency_resolutions_total",
        "Rounds resolved by the emergency watchdog"
    );
    describe_counter!("vrfguard_leadership_changes_total", "Leader election transitions");
    describe_gauge!("vrfguard_accounts_healthy", "Healthy, selectable oracle accounts");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Render the current exposition text, if a recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn record_attempt(account: &str, success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("vrfguard_attempts_total", "account" => account.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("vrfguard_attempt_duration_seconds", "account" => account.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_quarantine(account: &str, error_type: &str) {
    counter!(
        "vrfguard_quarantines_total",
        "account" => account.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

pub fn record_emergency_resolution(method: &str) {
    counter!("vrfguard_emergency_resolutions_total", "method" => method.to_string()).increment(1);
}

pub fn record_leadership_change(is_leader: bool) {
    let role = if is_leader { "leader" } else { "follower" };
    counter!("vrfguard_leadership_changes_total", "role" => role).increment(1);
}

pub fn set_healthy_accounts(count: usize) {
    gauge!("vrfguard_accounts_healthy").set(count as f64);
}
