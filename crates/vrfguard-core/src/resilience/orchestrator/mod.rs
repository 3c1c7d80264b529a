//! Retry orchestration for one logical oracle operation.
//!
//! ```text
//! attempting ──ok──► completed
//!     │
//!   failure ── abort / non-retryable / exhausted ──► failed
//!     │
//!     └── retryable ──► retrying (backoff) ──► attempting
//! ```
//!
//! Attempts within a run are strictly sequential. The consecutive-failure
//! counter is shared by every run on this orchestrator so a string of
//! failures across rounds can trip the "all accounts failing" abort.

mod backoff;

#[cfg(test)]
mod tests;

pub use backoff::{apply_jitter, Backoff};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vrfguard_types::{
    ChainStateAnchor, ErrorClassification, ErrorType, Operation, OracleAccount, OracleFailure,
    RetryConfig, RoundPhase, SelectionStrategy, Signature, StatusUpdate,
};

use crate::error::{AppError, AppResult};
use crate::resilience::metrics;
use crate::resilience::registry::AccountRegistry;
use crate::resilience::traits::{submit_and_confirm, TransactionSubmitter};

/// Orchestrator-wide failures tolerated before the emergency check applies.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Receives a [`StatusUpdate`] at the start of each attempt and at the end.
pub type StatusCallback = Arc<dyn Fn(StatusUpdate) + Send + Sync>;

/// Per-call overrides of [`RetryConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub rotate_accounts_on_failure: Option<bool>,
    pub selection_strategy: Option<SelectionStrategy>,
}

impl RetryOptions {
    pub fn resolve(&self, defaults: &RetryConfig) -> RetryConfig {
        RetryConfig {
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries).max(1),
            base_delay_ms: self.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            rotate_accounts_on_failure: self
                .rotate_accounts_on_failure
                .unwrap_or(defaults.rotate_accounts_on_failure),
            selection_strategy: self.selection_strategy.unwrap_or(defaults.selection_strategy),
        }
    }
}

/// Outcome of one orchestrator run.
#[derive(Debug)]
pub struct OrchestrationReport {
    pub outcome: AppResult<Signature>,
    pub attempts: u32,
    pub total_duration: Duration,
    /// Distinct accounts in first-use order
    pub accounts_used: Vec<String>,
}

impl OrchestrationReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.outcome.as_ref().ok()
    }
}

/// Bookkeeping for a single run.
struct RunState {
    started: Instant,
    attempts: u32,
    accounts_used: Vec<String>,
    last_error: Option<String>,
    on_status: Option<StatusCallback>,
}

impl RunState {
    fn emit(&self, status: RoundPhase, account: Option<&str>, success: Option<bool>) {
        if let Some(callback) = &self.on_status {
            callback(StatusUpdate {
                status,
                attempt: self.attempts,
                account: account.map(str::to_string),
                error: self.last_error.clone(),
                time_elapsed_ms: self.started.elapsed().as_millis() as u64,
                estimated_wait_ms: None,
                queue_position: None,
                success,
            });
        }
    }

    fn finish(self, outcome: AppResult<Signature>) -> OrchestrationReport {
        let phase = if outcome.is_ok() { RoundPhase::Completed } else { RoundPhase::Failed };
        let account = self.accounts_used.last().cloned();
        self.emit(phase, account.as_deref(), Some(outcome.is_ok()));
        OrchestrationReport {
            outcome,
            attempts: self.attempts,
            total_duration: self.started.elapsed(),
            accounts_used: self.accounts_used,
        }
    }
}

pub struct RetryOrchestrator {
    registry: Arc<AccountRegistry>,
    submitter: Arc<dyn TransactionSubmitter>,
    defaults: RetryConfig,
    consecutive_failures: AtomicU32,
    anchor: Mutex<Option<ChainStateAnchor>>,
}

impl RetryOrchestrator {
    pub fn new(
        registry: Arc<AccountRegistry>,
        submitter: Arc<dyn TransactionSubmitter>,
        defaults: RetryConfig,
    ) -> Self {
        Self {
            registry,
            submitter,
            defaults,
            consecutive_failures: AtomicU32::new(0),
            anchor: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn defaults(&self) -> &RetryConfig {
        &self.defaults
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Request randomness for a round from whichever oracle account each
    /// attempt lands on.
    pub async fn request_randomness(
        &self,
        round_id: &str,
        external_room_id: &str,
        options: &RetryOptions,
        on_status: Option<StatusCallback>,
    ) -> OrchestrationReport {
        self.execute(
            |account| Operation::RequestRandomness {
                round_id: round_id.to_string(),
                external_room_id: external_room_id.to_string(),
                oracle: account.identity.clone(),
            },
            options,
            on_status,
        )
        .await
    }

    /// Drive `make_operation` through up to `max_retries` attempts.
    pub async fn execute<F>(
        &self,
        make_operation: F,
        options: &RetryOptions,
        on_status: Option<StatusCallback>,
    ) -> OrchestrationReport
    where
        F: Fn(&OracleAccount) -> Operation,
    {
        let config = options.resolve(&self.defaults);
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut backoff = Backoff::new(&config);
        let mut run = RunState {
            started: Instant::now(),
            attempts: 0,
            accounts_used: Vec::new(),
            last_error: None,
            on_status,
        };
        let mut refresh_anchor = true;

        while run.attempts < config.max_retries {
            let consecutive = self.consecutive_failures();
            if consecutive > MAX_CONSECUTIVE_FAILURES && self.registry.requires_emergency_fallback() {
                tracing::error!(
                    consecutive_failures = consecutive,
                    "all oracle accounts failing, aborting for emergency fallback"
                );
                return run.finish(Err(AppError::AllAccountsFailing { consecutive_failures: consecutive }));
            }

            let account = match self.pick_account(run.attempts + 1, &run.accounts_used, &config) {
                Ok(account) => account,
                Err(e) => return run.finish(Err(e)),
            };
            run.attempts += 1;
            if !run.accounts_used.contains(&account.name) {
                run.accounts_used.push(account.name.clone());
            }

            let phase = if run.attempts == 1 { RoundPhase::Processing } else { RoundPhase::Retrying };
            run.emit(phase, Some(&account.name), None);

            let operation = make_operation(&account);
            let attempt_started = Instant::now();
            let result = match tokio::time::timeout(timeout, self.attempt(&operation, refresh_anchor)).await {
                Ok(result) => result,
                Err(_) => Err(OracleFailure::Timeout { elapsed_ms: config.timeout_ms }),
            };
            let elapsed = attempt_started.elapsed();

            let failure = match result {
                Ok(signature) => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.registry.record_success(&account.name, elapsed);
                    metrics::record_attempt(&account.name, true, elapsed);
                    tracing::info!(
                        account = %account.name,
                        attempt = run.attempts,
                        operation = operation.name(),
                        signature = %signature,
                        "oracle operation succeeded"
                    );
                    return run.finish(Ok(signature));
                },
                Err(failure) => failure,
            };

            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
            metrics::record_attempt(&account.name, false, elapsed);
            let classification = self.registry.handle_failure(&account.name, &failure);
            refresh_anchor = needs_anchor_refresh(&classification);
            run.last_error = Some(classification.message.clone());

            tracing::warn!(
                account = %account.name,
                attempt = run.attempts,
                error_type = %classification.error_type,
                severity = ?classification.severity,
                "oracle attempt failed: {}",
                classification.message
            );

            if classification.should_abort() {
                return run.finish(Err(AppError::NonRetryable {
                    error_type: classification.error_type,
                    message: classification.message,
                }));
            }
            if run.attempts >= config.max_retries {
                break;
            }

            let delay = backoff.next_delay(classification.wait_time_ms, run.attempts);
            tracing::debug!(attempt = run.attempts, delay_ms = delay.as_millis() as u64, "retry backoff");
            tokio::time::sleep(delay).await;
        }

        let attempts = run.attempts;
        let last_error = run.last_error.clone().unwrap_or_else(|| "no attempt made".to_string());
        run.finish(Err(AppError::RetriesExhausted { attempts, last_error }))
    }

    fn pick_account(
        &self,
        attempt: u32,
        tried: &[String],
        config: &RetryConfig,
    ) -> AppResult<OracleAccount> {
        if attempt > 1 && config.rotate_accounts_on_failure {
            let exclude: HashSet<String> = tried.iter().cloned().collect();
            if let Some(backup) = self.registry.get_backup_account(&exclude) {
                tracing::debug!(account = %backup.name, attempt, "rotating to backup account");
                return Ok(backup);
            }
        }
        self.registry.select_account(config.selection_strategy)
    }

    async fn attempt(&self, operation: &Operation, refresh_anchor: bool) -> Result<Signature, OracleFailure> {
        let anchor = self.current_anchor(refresh_anchor).await?;
        submit_and_confirm(self.submitter.as_ref(), operation, &anchor).await
    }

    async fn current_anchor(&self, force: bool) -> Result<ChainStateAnchor, OracleFailure> {
        if !force {
            let cached = self.anchor.lock().clone();
            if let Some(anchor) = cached.filter(|a| !a.is_expired()) {
                return Ok(anchor);
            }
        }
        let anchor = self.submitter.fresh_anchor().await?;
        *self.anchor.lock() = Some(anchor.clone());
        Ok(anchor)
    }
}

/// Timeouts, network errors and stale-state messages invalidate the anchor.
fn needs_anchor_refresh(classification: &ErrorClassification) -> bool {
    if matches!(classification.error_type, ErrorType::Timeout | ErrorType::Network) {
        return true;
    }
    let message = classification.message.to_ascii_lowercase();
    message.contains("stale") || message.contains("blockhash")
}
