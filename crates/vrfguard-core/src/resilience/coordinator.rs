//! Drives one round through orchestration, status tracking and the
//! emergency watchdog.
//!
//! ```text
//! start_round ─► StatusTracker::start_tracking (pending)
//!             ─► EmergencyResolver::start_monitoring
//!             ─► spawn RetryOrchestrator run
//!                   ok  ─► stop_monitoring ─► report_oracle_resolution
//!                   all accounts failing ─► force_emergency_resolution
//!                   other failure ─► left to the watchdog
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use vrfguard_types::{CoinSide, RoundError, RoundPhase, RoundStatus, StatusUpdate};

use crate::error::{AppError, AppResult};
use crate::resilience::emergency::{EmergencyOptions, EmergencyResolver};
use crate::resilience::orchestrator::{OrchestrationReport, RetryOptions, RetryOrchestrator, StatusCallback};
use crate::resilience::queue::QueuePositionEstimator;
use crate::resilience::status::StatusTracker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRequest {
    pub round_id: String,
    pub external_room_id: String,
    pub player_choice: CoinSide,
    #[serde(default)]
    pub retry: RetryOptions,
    #[serde(default)]
    pub emergency: EmergencyOptions,
}

impl RoundRequest {
    pub fn new(
        round_id: impl Into<String>,
        external_room_id: impl Into<String>,
        player_choice: CoinSide,
    ) -> Self {
        Self {
            round_id: round_id.into(),
            external_room_id: external_room_id.into(),
            player_choice,
            retry: RetryOptions::default(),
            emergency: EmergencyOptions::default(),
        }
    }
}

struct ActiveRun {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct RoundCoordinator {
    orchestrator: Arc<RetryOrchestrator>,
    emergency: Arc<EmergencyResolver>,
    tracker: Arc<StatusTracker>,
    estimator: Option<Arc<QueuePositionEstimator>>,
    runs: DashMap<String, ActiveRun>,
    requests: DashMap<String, RoundRequest>,
    generation: AtomicU64,
}

impl RoundCoordinator {
    pub fn new(
        orchestrator: Arc<RetryOrchestrator>,
        emergency: Arc<EmergencyResolver>,
        tracker: Arc<StatusTracker>,
    ) -> Self {
        Self {
            orchestrator,
            emergency,
            tracker,
            estimator: None,
            runs: DashMap::new(),
            requests: DashMap::new(),
            generation: AtomicU64::new(1),
        }
    }

    /// Attach queue estimates to pending rounds and learn from real waits.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<QueuePositionEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn emergency(&self) -> &Arc<EmergencyResolver> {
        &self.emergency
    }

    pub fn orchestrator(&self) -> &Arc<RetryOrchestrator> {
        &self.orchestrator
    }

    pub fn is_running(&self, round_id: &str) -> bool {
        self.runs.get(round_id).is_some_and(|run| !run.handle.is_finished())
    }

    /// Begin a round. At most one orchestrator run per round is in flight.
    pub fn start_round(self: &Arc<Self>, request: RoundRequest) -> AppResult<RoundStatus> {
        let round_id = request.round_id.clone();
        if self.emergency.is_settled(&round_id) {
            return Err(RoundError::AlreadyResolved { round_id }.into());
        }
        if self.is_running(&round_id) {
            return Err(RoundError::AlreadyRunning { round_id }.into());
        }
        self.requests.retain(|id, _| !self.emergency.is_settled(id));

        let max_attempts = request.retry.resolve(self.orchestrator.defaults()).max_retries;
        let status =
            self.tracker.start_tracking(&round_id, &request.external_room_id, max_attempts);
        self.emergency.start_monitoring(
            &round_id,
            &request.external_room_id,
            request.player_choice,
            &request.emergency,
        )?;

        self.requests.insert(round_id.clone(), request.clone());
        self.spawn_run(request)?;
        tracing::info!(round_id = %round_id, max_attempts, "round started");
        Ok(status)
    }

    /// Re-arm the watchdog and, unless a run is still active, start a fresh
    /// orchestrator run. Returns the manual retry count.
    pub fn manual_retry(self: &Arc<Self>, round_id: &str) -> AppResult<u32> {
        let request = self
            .requests
            .get(round_id)
            .map(|r| r.clone())
            .ok_or_else(|| AppError::UnknownRound(round_id.to_string()))?;
        let attempts = self.emergency.manual_retry_vrf(round_id)?;
        if self.is_running(round_id) {
            tracing::debug!(round_id = %round_id, "run still active, watchdog re-armed only");
        } else {
            self.spawn_run(request)?;
        }
        Ok(attempts)
    }

    fn spawn_run(self: &Arc<Self>, request: RoundRequest) -> AppResult<()> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        match self.runs.entry(request.round_id.clone()) {
            Entry::Occupied(entry) if !entry.get().handle.is_finished() => {
                Err(RoundError::AlreadyRunning { round_id: request.round_id }.into())
            },
            entry => {
                let coordinator = Arc::clone(self);
                let handle = tokio::spawn(async move { coordinator.drive(request, generation).await });
                entry.insert(ActiveRun { generation, handle });
                Ok(())
            },
        }
    }

    async fn drive(self: Arc<Self>, request: RoundRequest, generation: u64) {
        let round_id = request.round_id.as_str();
        let estimate = self.advise(round_id).await;

        let tracker = Arc::clone(&self.tracker);
        let tracked = request.round_id.clone();
        let on_status: StatusCallback = Arc::new(move |update: StatusUpdate| {
            // Terminal status comes from the resolution path, not the run.
            if !update.status.is_terminal() {
                tracker.apply_update(&tracked, &update);
            }
        });

        let report = self
            .orchestrator
            .request_randomness(round_id, &request.external_room_id, &request.retry, Some(on_status))
            .await;
        self.settle(round_id, &report).await;

        if let (Some(estimator), Some((account, queue))) = (&self.estimator, estimate) {
            if report.is_success() && report.accounts_used.last() == Some(&account) {
                estimator.record_observed_wait(&queue, report.total_duration);
            }
        }
        self.runs.remove_if(round_id, |_, run| run.generation == generation);
    }

    async fn settle(&self, round_id: &str, report: &OrchestrationReport) {
        match &report.outcome {
            Ok(signature) => {
                self.emergency.stop_monitoring(round_id);
                if self.emergency.report_oracle_resolution(round_id, signature).is_none() {
                    tracing::debug!(round_id = %round_id, "oracle result arrived after settlement");
                }
                self.requests.remove(round_id);
            },
            Err(e) if e.requires_emergency() => {
                tracing::warn!(round_id = %round_id, "no usable oracle account, resolving now: {}", e);
                if let Err(e) = self.emergency.force_emergency_resolution(round_id).await {
                    tracing::warn!(round_id = %round_id, "forced resolution unavailable: {}", e);
                }
            },
            Err(e) => {
                tracing::warn!(
                    round_id = %round_id,
                    attempts = report.attempts,
                    "oracle path gave up, awaiting emergency window: {}",
                    e
                );
                self.tracker.apply_update(
                    round_id,
                    &StatusUpdate {
                        status: RoundPhase::Retrying,
                        attempt: report.attempts,
                        account: report.accounts_used.last().cloned(),
                        error: Some(e.to_string()),
                        time_elapsed_ms: report.total_duration.as_millis() as u64,
                        estimated_wait_ms: None,
                        queue_position: None,
                        success: Some(false),
                    },
                );
            },
        }
    }

    /// Attach the best queue's estimate to the pending round. Returns the
    /// account and queue it was computed for.
    async fn advise(&self, round_id: &str) -> Option<(String, String)> {
        let estimator = self.estimator.as_ref()?;
        let best = match estimator.find_best_queue(self.orchestrator.registry().accounts()).await {
            Ok(best) => best?,
            Err(e) => {
                tracing::debug!(round_id = %round_id, "queue estimate unavailable: {}", e);
                return None;
            },
        };
        let estimate = estimator.estimate(&best.account).await.ok()?;
        self.tracker.apply_update(
            round_id,
            &StatusUpdate {
                status: RoundPhase::Pending,
                attempt: 0,
                account: None,
                error: None,
                time_elapsed_ms: 0,
                estimated_wait_ms: Some(estimate.estimated_wait_ms),
                queue_position: Some(estimate.position),
                success: None,
            },
        );
        Some((best.account.name, estimate.queue?))
    }

    /// Abort every run and cancel every watch.
    pub fn shutdown(&self) -> usize {
        let mut aborted = 0;
        self.runs.retain(|_, run| {
            run.handle.abort();
            aborted += 1;
            false
        });
        let cancelled = self.emergency.cleanup();
        tracing::info!(aborted, cancelled, "round coordinator stopped");
        aborted
    }
}
