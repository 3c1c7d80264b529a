//! Error classification with per-account failure tracking.
//!
//! A failure is classified from its structured kind, then from its text,
//! then defaults to `unknown/medium/retryable`. The result is adjusted by
//! two pieces of state held here:
//! - per-account failure counters (3+ tracked failures escalate to
//!   `critical` / `switch_account`; counters expire after 10 minutes)
//! - the last reported ambient network health, trusted for 30 seconds
//!   (unhealthy doubles the wait)

mod patterns;

#[cfg(test)]
mod tests;

pub(crate) use patterns::base_classification;

use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use vrfguard_types::{ErrorClassification, ErrorType, OracleFailure, Severity, SuggestedAction};

/// Failures on one account before it is treated as critical.
pub const FAILURE_ESCALATION_THRESHOLD: u32 = 3;

const FAILURE_COUNT_EXPIRY: Duration = Duration::from_secs(600);
const NETWORK_HEALTH_TTL: Duration = Duration::from_secs(30);
const MAX_RECOMMENDED_WAIT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: Instant,
}

#[derive(Debug, Clone, Copy)]
struct NetworkObservation {
    healthy: bool,
    observed_at: Instant,
}

#[derive(Default)]
pub struct ErrorClassifier {
    failures: DashMap<String, FailureRecord>,
    network: RwLock<Option<NetworkObservation>>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `error`. When `account` is given, its failure counter is
    /// incremented first and used for escalation.
    pub fn classify(&self, error: &OracleFailure, account: Option<&str>) -> ErrorClassification {
        let mut classification = base_classification(error);

        if let Some(account) = account {
            let count = self.bump_failures(account);
            if count >= FAILURE_ESCALATION_THRESHOLD && !classification.should_abort() {
                classification.severity = Severity::Critical;
                classification.suggested_action = SuggestedAction::SwitchAccount;
            }
            tracing::debug!(
                account = %account,
                failures = count,
                error_type = %classification.error_type,
                "classified oracle failure"
            );
        }

        if self.network_unhealthy() && classification.is_retryable {
            classification.wait_time_ms = classification.wait_time_ms.saturating_mul(2);
            classification.message.push_str(" (network degraded)");
        }

        classification
    }

    fn bump_failures(&self, account: &str) -> u32 {
        let now = Instant::now();
        let mut entry = self
            .failures
            .entry(account.to_string())
            .or_insert(FailureRecord { count: 0, last_failure: now });
        if now.duration_since(entry.last_failure) > FAILURE_COUNT_EXPIRY {
            tracing::debug!(account = %account, "failure count expired, reset to 0");
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.last_failure = now;
        entry.count
    }

    /// Tracked failures for `account`; 0 once the counter has expired.
    pub fn failure_count(&self, account: &str) -> u32 {
        self.failures
            .get(account)
            .filter(|r| r.last_failure.elapsed() <= FAILURE_COUNT_EXPIRY)
            .map_or(0, |r| r.count)
    }

    pub fn clear_account_failures(&self, account: &str) {
        if self.failures.remove(account).is_some() {
            tracing::debug!(account = %account, "failure count cleared");
        }
    }

    pub fn report_network_health(&self, healthy: bool) {
        *self.network.write() = Some(NetworkObservation { healthy, observed_at: Instant::now() });
    }

    /// True only while a recent observation said the network is unhealthy.
    pub fn network_unhealthy(&self) -> bool {
        let observation = *self.network.read();
        observation.is_some_and(|n| !n.healthy && n.observed_at.elapsed() <= NETWORK_HEALTH_TTL)
    }

    /// Whether the failure is caused by the user (rejection, funds, wallet
    /// authorization), structured or recognised from text. Does not touch
    /// counters.
    pub fn is_user_caused(&self, error: &OracleFailure) -> bool {
        base_classification(error).should_abort()
    }

    /// `min(base_wait × 2^(attempt-1), 30s)`; does not touch counters.
    pub fn recommended_wait_time(&self, error: &OracleFailure, attempt: u32) -> u64 {
        let base = base_classification(error).wait_time_ms;
        let factor = 1_u64 << attempt.saturating_sub(1).min(20);
        base.saturating_mul(factor).min(MAX_RECOMMENDED_WAIT_MS)
    }

    pub fn requires_emergency_fallback(&self, error: &OracleFailure, consecutive_failures: u32) -> bool {
        let classification = base_classification(error);
        classification.is_critical()
            || consecutive_failures >= FAILURE_ESCALATION_THRESHOLD
            || (classification.error_type == ErrorType::Timeout && consecutive_failures >= 2)
    }
}
