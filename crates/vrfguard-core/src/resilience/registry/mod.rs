//! Oracle account registry.
//!
//! Holds the immutable account list (registration order), one live
//! [`AccountHealth`] per account, and the quarantine set. Selection is
//! advisory load balancing: peers may select the same account concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  AccountRegistry                                             │
//! │  ├── accounts: Vec<OracleAccount>     (registration order)   │
//! │  ├── health: DashMap<name, AccountHealth>                    │
//! │  ├── quarantine: QuarantineSet        (scheduled expiry)     │
//! │  └── classifier: Arc<ErrorClassifier> (failure counters)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod probe;
mod quarantine;
mod selection;

#[cfg(test)]
mod tests;

pub use probe::{HealthProbe, ProbeReport};
pub use quarantine::{quarantine_duration, QuarantineSet, DEFAULT_QUARANTINE};
pub use selection::health_score;

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vrfguard_types::{
    AccountHealth, ErrorClassification, ErrorType, HealthThresholds, HealthUpdate, OracleAccount,
    OracleFailure, ResilienceConfig, SelectionStrategy,
};

use crate::error::{AppError, AppResult};
use crate::resilience::classifier::{ErrorClassifier, FAILURE_ESCALATION_THRESHOLD};
use crate::resilience::metrics;

/// Accounts above this success rate count as usable for fallback decisions.
const USABLE_SUCCESS_RATE: f64 = 0.3;
/// Fewer usable accounts than this means the emergency path is required.
const MIN_USABLE_ACCOUNTS: usize = 2;

const TIMEOUT_RESPONSE_PENALTY_MS: f64 = 2000.0;
const QUEUE_FULL_DEPTH_PENALTY: u64 = 5;
const SUCCESS_EMA_WEIGHT: f64 = 0.1;
const RESPONSE_EMA_WEIGHT: f64 = 0.2;

/// Snapshot of one account for display and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub account: OracleAccount,
    pub health: AccountHealth,
    pub quarantined: bool,
    pub quarantine_remaining_ms: Option<u64>,
    pub failure_count: u32,
    pub score: f64,
}

pub struct AccountRegistry {
    accounts: Vec<OracleAccount>,
    health: DashMap<String, AccountHealth>,
    thresholds: HealthThresholds,
    classifier: Arc<ErrorClassifier>,
    quarantine: QuarantineSet,
    cursor: AtomicUsize,
}

impl AccountRegistry {
    pub fn new(
        accounts: Vec<OracleAccount>,
        thresholds: HealthThresholds,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        let mut seen = HashSet::new();
        let accounts: Vec<OracleAccount> = accounts
            .into_iter()
            .filter(|a| {
                let fresh = seen.insert(a.name.clone());
                if !fresh {
                    tracing::warn!(account = %a.name, "duplicate oracle account name ignored");
                }
                fresh
            })
            .collect();

        let health = accounts.iter().map(|a| (a.name.clone(), AccountHealth::default())).collect();

        Self {
            accounts,
            health,
            thresholds,
            classifier,
            quarantine: QuarantineSet::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &ResilienceConfig, classifier: Arc<ErrorClassifier>) -> Self {
        Self::new(config.oracle_accounts(), config.health, classifier)
    }

    pub fn accounts(&self) -> &[OracleAccount] {
        &self.accounts
    }

    pub fn account(&self, name: &str) -> Option<&OracleAccount> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn health(&self, name: &str) -> Option<AccountHealth> {
        self.health.get(name).map(|h| h.clone())
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    pub fn is_quarantined(&self, name: &str) -> bool {
        self.quarantine.contains(name)
    }

    pub fn quarantine(&self, name: &str, duration: Duration, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(
            account = %name,
            duration_secs = duration.as_secs(),
            reason = %reason,
            "oracle account quarantined"
        );
        self.quarantine.insert(name, duration, reason);
    }

    pub fn release_quarantine(&self, name: &str) -> bool {
        self.quarantine.release(name)
    }

    fn selectable(&self) -> impl Iterator<Item = &OracleAccount> {
        self.accounts.iter().filter(|a| !self.quarantine.contains(&a.name))
    }

    /// Healthy and not quarantined.
    pub fn healthy_count(&self) -> usize {
        self.selectable()
            .filter(|a| self.health.get(&a.name).is_some_and(|h| h.is_healthy))
            .count()
    }

    /// Pick an account for an attempt. Never returns a quarantined account;
    /// fails only when every account is quarantined (or none is registered).
    pub fn select_account(&self, strategy: SelectionStrategy) -> AppResult<OracleAccount> {
        let selected = match strategy {
            SelectionStrategy::RoundRobin => self.select_round_robin(),
            SelectionStrategy::HealthBased => self.select_health_based(),
        }?;
        tracing::debug!(account = %selected.name, ?strategy, "oracle account selected");
        Ok(selected)
    }

    fn select_round_robin(&self) -> AppResult<OracleAccount> {
        let total = self.accounts.len();
        if total == 0 {
            return Err(AppError::NoSelectableAccount("no oracle accounts registered".into()));
        }
        for _ in 0..total {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % total;
            let account = &self.accounts[index];
            if !self.quarantine.contains(&account.name) {
                return Ok(account.clone());
            }
        }
        Err(AppError::NoSelectableAccount(format!("all {total} oracle accounts are quarantined")))
    }

    fn select_health_based(&self) -> AppResult<OracleAccount> {
        let mut candidates: Vec<(OracleAccount, f64)> = self
            .selectable()
            .filter_map(|a| {
                let health = self.health.get(&a.name)?;
                health
                    .is_healthy
                    .then(|| (a.clone(), selection::health_score(&health, &self.thresholds)))
            })
            .collect();

        candidates.sort_by(selection::by_score);
        if let Some((account, _)) = candidates.into_iter().next() {
            return Ok(account);
        }

        tracing::debug!("no healthy oracle account, falling back to round-robin");
        self.select_round_robin()
    }

    /// Merge a partial observation and re-derive `is_healthy`.
    pub fn update_health(&self, name: &str, update: HealthUpdate) {
        if let Some(mut health) = self.health.get_mut(name) {
            health.apply(&update, &self.thresholds);
        }
    }

    /// Apply a peer's observation if it is newer than ours. Ties keep local.
    /// Values are clamped like local updates; non-finite ones are ignored.
    pub fn merge_remote_health(&self, name: &str, remote: &AccountHealth) -> bool {
        let Some(mut local) = self.health.get_mut(name) else {
            return false;
        };
        if remote.last_updated <= local.last_updated {
            return false;
        }
        let observed = HealthUpdate {
            queue_depth: Some(remote.queue_depth),
            avg_response_time_ms: Some(remote.avg_response_time_ms),
            success_rate: Some(remote.success_rate),
        };
        local.apply(&observed, &self.thresholds);
        local.last_updated = remote.last_updated;
        true
    }

    /// Nudge health after a successful call and clear failure history.
    pub fn record_success(&self, name: &str, response_time: Duration) {
        let observed_ms = response_time.as_secs_f64() * 1000.0;
        if let Some(mut health) = self.health.get_mut(name) {
            let success_rate = health.success_rate * (1.0 - SUCCESS_EMA_WEIGHT) + SUCCESS_EMA_WEIGHT;
            let avg_response_time_ms = if health.avg_response_time_ms <= 0.0 {
                observed_ms
            } else {
                health.avg_response_time_ms * (1.0 - RESPONSE_EMA_WEIGHT)
                    + observed_ms * RESPONSE_EMA_WEIGHT
            };
            let update = HealthUpdate {
                queue_depth: None,
                avg_response_time_ms: Some(avg_response_time_ms),
                success_rate: Some(success_rate.min(1.0)),
            };
            health.apply(&update, &self.thresholds);
        }
        self.classifier.clear_account_failures(name);
    }

    /// Classify a failure on `name`, degrade its health and quarantine it
    /// when the failure is critical or repeated.
    ///
    /// User-caused failures (rejection, funds) are classified but do not
    /// count against the account.
    pub fn handle_failure(&self, name: &str, error: &OracleFailure) -> ErrorClassification {
        if self.classifier.is_user_caused(error) {
            return self.classifier.classify(error, None);
        }

        let classification = self.classifier.classify(error, Some(name));
        self.degrade(name, &classification);

        let failures = self.classifier.failure_count(name);
        if classification.is_critical() || failures >= FAILURE_ESCALATION_THRESHOLD {
            let duration = quarantine_duration(classification.wait_time_ms);
            self.quarantine(
                name,
                duration,
                format!("{} after {} failures", classification.error_type, failures),
            );
            metrics::record_quarantine(name, &classification.error_type.to_string());
        }
        metrics::set_healthy_accounts(self.healthy_count());

        classification
    }

    fn degrade(&self, name: &str, classification: &ErrorClassification) {
        let Some(mut health) = self.health.get_mut(name) else {
            return;
        };
        let update = match classification.error_type {
            ErrorType::Timeout => HealthUpdate::response_time(
                health.avg_response_time_ms * 1.5 + TIMEOUT_RESPONSE_PENALTY_MS,
            ),
            ErrorType::QueueFull => HealthUpdate::queue_depth(
                health.queue_depth.saturating_mul(2).saturating_add(QUEUE_FULL_DEPTH_PENALTY),
            ),
            ErrorType::OracleOffline => HealthUpdate::success_rate(health.success_rate * 0.5),
            ErrorType::AccountInvalid => HealthUpdate::success_rate(0.0),
            ErrorType::Network | ErrorType::Unknown => {
                HealthUpdate::success_rate(health.success_rate * 0.9)
            },
        };
        health.apply(&update, &self.thresholds);
        if classification.error_type == ErrorType::AccountInvalid {
            health.is_healthy = false;
        }
    }

    /// Best non-quarantined, non-excluded account with fewer than three
    /// tracked failures, or `None`.
    pub fn get_backup_account(&self, exclude: &HashSet<String>) -> Option<OracleAccount> {
        let mut candidates: Vec<(OracleAccount, AccountHealth)> = self
            .selectable()
            .filter(|a| !exclude.contains(&a.name))
            .filter(|a| self.classifier.failure_count(&a.name) < FAILURE_ESCALATION_THRESHOLD)
            .filter_map(|a| self.health(&a.name).map(|h| (a.clone(), h)))
            .collect();
        candidates.sort_by(selection::backup_order);
        candidates.into_iter().next().map(|(account, _)| account)
    }

    /// True when fewer than two accounts are both selectable and above a
    /// 0.3 success rate.
    pub fn requires_emergency_fallback(&self) -> bool {
        let usable = self
            .selectable()
            .filter(|a| self.health.get(&a.name).is_some_and(|h| h.success_rate > USABLE_SUCCESS_RATE))
            .count();
        usable < MIN_USABLE_ACCOUNTS
    }

    pub fn snapshot(&self) -> Vec<AccountView> {
        self.accounts
            .iter()
            .filter_map(|account| {
                let health = self.health(&account.name)?;
                let remaining = self.quarantine.remaining(&account.name);
                Some(AccountView {
                    score: selection::health_score(&health, &self.thresholds),
                    failure_count: self.classifier.failure_count(&account.name),
                    quarantined: remaining.is_some(),
                    quarantine_remaining_ms: remaining.map(|d| d.as_millis() as u64),
                    account: account.clone(),
                    health,
                })
            })
            .collect()
    }
}
