//! Per-round emergency watchdog.
//!
//! Each monitored round has exactly one [`EmergencyWatch`] holding a
//! cancellable timer. When the timer fires before the oracle path succeeds
//! the round is settled locally: the configured fallback method picks an
//! outcome, which is submitted as a `ResolveRound`; if that submission
//! fails a `Refund` is submitted instead. Completion is always reported to
//! the [`StatusTracker`].
//!
//! Resolution is first-wins per round: the oracle path and the watchdog
//! both go through [`EmergencyResolver::try_settle`], so whichever arrives
//! second is a no-op.

mod outcome;


pub use outcome::{compute_outcome, FallbackOutcome};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vrfguard_types::{
    CoinSide, EmergencyConfig, EmergencyEvent, EmergencyResolution, FallbackMethod, Operation,
    OracleFailure, ResolutionMethod, RoundError, Signature,
};

use crate::error::{AppError, AppResult};
use crate::resilience::events::{EventBus, Subscription};
use crate::resilience::metrics;
use crate::resilience::scheduler::ScheduledTask;
use crate::resilience::status::{CompletionReport, StatusTracker};
use crate::resilience::traits::{execute_operation, TransactionSubmitter};

/// How long a settlement record blocks re-monitoring of the same round.
pub const SETTLED_RETENTION: Duration = Duration::from_secs(600);

/// Per-call overrides of [`EmergencyConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyOptions {
    pub timeout_ms: Option<u64>,
    pub fallback_method: Option<FallbackMethod>,
    pub enable_manual_retry: Option<bool>,
    pub settlement_timeout_ms: Option<u64>,
}

impl EmergencyOptions {
    pub fn resolve(&self, defaults: &EmergencyConfig) -> EmergencyConfig {
        EmergencyConfig {
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            fallback_method: self.fallback_method.unwrap_or(defaults.fallback_method),
            enable_manual_retry: self.enable_manual_retry.unwrap_or(defaults.enable_manual_retry),
            settlement_timeout_ms: self
                .settlement_timeout_ms
                .unwrap_or(defaults.settlement_timeout_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct WatchContext {
    round_id: String,
    external_room_id: String,
    player_choice: CoinSide,
    options: EmergencyConfig,
    attempts: u32,
}

struct EmergencyWatch {
    id: u64,
    started: Instant,
    ctx: WatchContext,
    timer: ScheduledTask,
}

/// Read-only view of a watch.
#[derive(Debug, Clone, Serialize)]
pub struct WatchInfo {
    pub round_id: String,
    pub external_room_id: String,
    pub player_choice: CoinSide,
    pub method: FallbackMethod,
    pub timeout_ms: u64,
    pub attempts: u32,
    pub remaining_ms: u64,
}

pub struct EmergencyResolver {
    submitter: Arc<dyn TransactionSubmitter>,
    tracker: Arc<StatusTracker>,
    defaults: EmergencyConfig,
    watches: DashMap<String, EmergencyWatch>,
    settled: Arc<DashMap<String, (ResolutionMethod, u64)>>,
    next_id: AtomicU64,
    events: EventBus<EmergencyEvent>,
}

impl EmergencyResolver {
    pub fn new(
        submitter: Arc<dyn TransactionSubmitter>,
        tracker: Arc<StatusTracker>,
        defaults: EmergencyConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            submitter,
            tracker,
            defaults,
            watches: DashMap::new(),
            settled: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            events: EventBus::new(),
        })
    }

    pub fn subscribe(&self) -> Subscription<EmergencyEvent> {
        self.events.subscribe()
    }

    pub fn defaults(&self) -> &EmergencyConfig {
        &self.defaults
    }

    /// Arm the watchdog for a round, replacing any existing watch.
    pub fn start_monitoring(
        self: &Arc<Self>,
        round_id: &str,
        external_room_id: &str,
        player_choice: CoinSide,
        options: &EmergencyOptions,
    ) -> AppResult<EmergencyConfig> {
        if self.is_settled(round_id) {
            return Err(RoundError::AlreadyResolved { round_id: round_id.to_string() }.into());
        }

        let config = options.resolve(&self.defaults);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timer = self.arm(round_id, id, Duration::from_millis(config.timeout_ms));
        let watch = EmergencyWatch {
            id,
            started: Instant::now(),
            ctx: WatchContext {
                round_id: round_id.to_string(),
                external_room_id: external_room_id.to_string(),
                player_choice,
                options: config.clone(),
                attempts: 0,
            },
            timer,
        };

        if self.watches.insert(round_id.to_string(), watch).is_some() {
            tracing::debug!(round_id = %round_id, "replaced existing emergency watch");
        }
        tracing::info!(
            round_id = %round_id,
            timeout_ms = config.timeout_ms,
            method = %config.fallback_method,
            "emergency monitoring started"
        );
        self.events.publish(&EmergencyEvent::MonitoringStarted {
            round_id: round_id.to_string(),
            external_room_id: external_room_id.to_string(),
            timeout_ms: config.timeout_ms,
            method: config.fallback_method,
        });
        Ok(config)
    }

    fn arm(self: &Arc<Self>, round_id: &str, id: u64, timeout: Duration) -> ScheduledTask {
        let resolver = Arc::downgrade(self);
        let round_id = round_id.to_string();
        ScheduledTask::after(timeout, async move {
            if let Some(resolver) = resolver.upgrade() {
                resolver.on_timeout(&round_id, id).await;
            }
        })
    }

    /// Cancel the watchdog. Returns whether a watch existed.
    pub fn stop_monitoring(&self, round_id: &str) -> bool {
        let Some((_, watch)) = self.watches.remove(round_id) else {
            return false;
        };
        tracing::debug!(round_id = %round_id, "emergency monitoring stopped");
        self.events.publish(&EmergencyEvent::MonitoringStopped {
            round_id: watch.ctx.round_id.clone(),
            external_room_id: watch.ctx.external_room_id.clone(),
            timeout_ms: watch.ctx.options.timeout_ms,
            method: watch.ctx.options.fallback_method,
        });
        true
    }

    /// Record that the oracle path resolved the round. Call after
    /// [`EmergencyResolver::stop_monitoring`]. `None` if already settled.
    pub fn report_oracle_resolution(
        &self,
        round_id: &str,
        signature: &Signature,
    ) -> Option<EmergencyResolution> {
        if !self.try_settle(round_id, ResolutionMethod::Oracle) {
            tracing::debug!(round_id = %round_id, "oracle success after settlement ignored");
            return None;
        }

        let resolution = EmergencyResolution {
            round_id: round_id.to_string(),
            resolved: true,
            method: ResolutionMethod::Oracle,
            result: None,
            signature: Some(signature.to_string()),
            reason: "oracle fulfilled the randomness request".to_string(),
            timestamp: Utc::now(),
        };
        self.events.publish(&EmergencyEvent::Resolution(resolution.clone()));
        self.tracker.complete_game(
            round_id,
            CompletionReport {
                success: true,
                outcome: None,
                method: ResolutionMethod::Oracle,
                signature: resolution.signature.clone(),
                error: None,
            },
        );
        Some(resolution)
    }

    /// Re-arm the watchdog and count the retry. Does not resolve.
    pub fn manual_retry_vrf(self: &Arc<Self>, round_id: &str) -> AppResult<u32> {
        let (timeout_ms, enabled) = self
            .watches
            .get(round_id)
            .map(|w| (w.ctx.options.timeout_ms, w.ctx.options.enable_manual_retry))
            .ok_or_else(|| AppError::UnknownRound(round_id.to_string()))?;
        if !enabled {
            return Err(RoundError::ManualRetryDisabled { round_id: round_id.to_string() }.into());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timer = self.arm(round_id, id, Duration::from_millis(timeout_ms));
        let attempts = {
            let mut watch = self
                .watches
                .get_mut(round_id)
                .ok_or_else(|| AppError::UnknownRound(round_id.to_string()))?;
            watch.id = id;
            watch.started = Instant::now();
            watch.timer = timer;
            watch.ctx.attempts += 1;
            watch.ctx.attempts
        };

        tracing::info!(round_id = %round_id, attempts, "manual randomness retry, watchdog re-armed");
        self.events.publish(&EmergencyEvent::Resolution(EmergencyResolution {
            round_id: round_id.to_string(),
            resolved: false,
            method: ResolutionMethod::ManualRetry,
            result: None,
            signature: None,
            reason: format!("manual retry #{attempts}"),
            timestamp: Utc::now(),
        }));
        Ok(attempts)
    }

    /// Settle the round now through the fallback path.
    ///
    /// `Ok(None)` when the round was already settled.
    pub async fn force_emergency_resolution(
        &self,
        round_id: &str,
    ) -> AppResult<Option<EmergencyResolution>> {
        if let Some((_, watch)) = self.watches.remove(round_id) {
            let EmergencyWatch { ctx, timer, .. } = watch;
            drop(timer);
            tracing::warn!(round_id = %round_id, "emergency resolution forced");
            return Ok(self.resolve(ctx, "forced").await);
        }
        if self.is_settled(round_id) {
            return Ok(None);
        }
        Err(AppError::UnknownRound(round_id.to_string()))
    }

    async fn on_timeout(&self, round_id: &str, id: u64) {
        let Some((_, watch)) = self.watches.remove_if(round_id, |_, w| w.id == id) else {
            return;
        };
        let EmergencyWatch { ctx, timer, .. } = watch;
        timer.detach();

        tracing::warn!(
            round_id = %round_id,
            timeout_ms = ctx.options.timeout_ms,
            method = %ctx.options.fallback_method,
            "oracle did not respond within the emergency window"
        );
        self.events.publish(&EmergencyEvent::Resolution(EmergencyResolution {
            round_id: round_id.to_string(),
            resolved: false,
            method: ResolutionMethod::Timeout,
            result: None,
            signature: None,
            reason: format!("oracle did not respond within {}ms", ctx.options.timeout_ms),
            timestamp: Utc::now(),
        }));

        self.resolve(ctx, "timeout").await;
    }

    async fn resolve(&self, ctx: WatchContext, trigger: &str) -> Option<EmergencyResolution> {
        if !self.try_settle(&ctx.round_id, ResolutionMethod::Emergency) {
            tracing::debug!(round_id = %ctx.round_id, "round already settled, emergency path skipped");
            return None;
        }

        let method = ctx.options.fallback_method;
        let outcome = compute_outcome(
            method,
            &ctx.round_id,
            &ctx.external_room_id,
            ctx.player_choice,
            Utc::now().timestamp_millis(),
        );
        let resolve = Operation::ResolveRound {
            round_id: ctx.round_id.clone(),
            external_room_id: ctx.external_room_id.clone(),
            outcome: outcome.side,
            method,
        };

        let settle_timeout = Duration::from_millis(ctx.options.settlement_timeout_ms);
        let proof = outcome.proof.as_deref().map(|p| format!(" (sha256 {p})")).unwrap_or_default();
        let (resolved, result, signature, reason, label) =
            match self.submit_bounded(&resolve, settle_timeout).await {
                Ok(signature) => (
                    true,
                    Some(outcome.side),
                    Some(signature.0),
                    format!("{trigger}: resolved {} by {method}{proof}", outcome.side),
                    method.to_string(),
                ),
                Err(resolve_error) => {
                    tracing::warn!(round_id = %ctx.round_id, "emergency resolution failed, refunding: {}", resolve_error);
                    let refund = Operation::Refund {
                        round_id: ctx.round_id.clone(),
                        external_room_id: ctx.external_room_id.clone(),
                    };
                    match self.submit_bounded(&refund, settle_timeout).await {
                        Ok(signature) => (
                            true,
                            None,
                            Some(signature.0),
                            format!("{trigger}: {method} resolution failed ({resolve_error}), refunded"),
                            "refund".to_string(),
                        ),
                        Err(refund_error) => {
                            tracing::error!(round_id = %ctx.round_id, "refund failed: {}", refund_error);
                            (
                                false,
                                None,
                                None,
                                format!("{trigger}: resolution failed ({resolve_error}) and refund failed ({refund_error})"),
                                "failed".to_string(),
                            )
                        },
                    }
                },
            };

        metrics::record_emergency_resolution(&label);
        let resolution = EmergencyResolution {
            round_id: ctx.round_id.clone(),
            resolved,
            method: ResolutionMethod::Emergency,
            result,
            signature,
            reason,
            timestamp: Utc::now(),
        };
        tracing::info!(
            round_id = %ctx.round_id,
            resolved,
            outcome = ?result,
            "{}",
            resolution.reason
        );

        self.events.publish(&EmergencyEvent::Resolution(resolution.clone()));
        self.tracker.complete_game(
            &ctx.round_id,
            CompletionReport {
                success: resolved,
                outcome: result,
                method: ResolutionMethod::Emergency,
                signature: resolution.signature.clone(),
                error: (!resolved).then(|| resolution.reason.clone()),
            },
        );
        Some(resolution)
    }

    /// A hung submission counts as a failure so the round always completes.
    async fn submit_bounded(
        &self,
        operation: &Operation,
        timeout: Duration,
    ) -> Result<Signature, OracleFailure> {
        match tokio::time::timeout(timeout, execute_operation(self.submitter.as_ref(), operation))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(OracleFailure::Timeout { elapsed_ms: timeout.as_millis() as u64 }),
        }
    }

    /// First caller for a round wins. The record expires after
    /// [`SETTLED_RETENTION`].
    fn try_settle(&self, round_id: &str, method: ResolutionMethod) -> bool {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.settled.entry(round_id.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(entry) => {
                entry.insert((method, id));
            },
        }

        let settled = Arc::clone(&self.settled);
        let key = round_id.to_string();
        if let Some(expiry) = ScheduledTask::try_after(SETTLED_RETENTION, async move {
            settled.remove_if(&key, |_, (_, settle_id)| *settle_id == id);
        }) {
            expiry.detach();
        }
        true
    }

    pub fn is_settled(&self, round_id: &str) -> bool {
        self.settled.contains_key(round_id)
    }

    /// How the round was settled, if it was.
    pub fn settlement(&self, round_id: &str) -> Option<ResolutionMethod> {
        self.settled.get(round_id).map(|s| s.0)
    }

    pub fn is_monitoring(&self, round_id: &str) -> bool {
        self.watches.contains_key(round_id)
    }

    pub fn watch_info(&self, round_id: &str) -> Option<WatchInfo> {
        self.watches.get(round_id).map(|w| {
            let timeout = Duration::from_millis(w.ctx.options.timeout_ms);
            WatchInfo {
                round_id: w.ctx.round_id.clone(),
                external_room_id: w.ctx.external_room_id.clone(),
                player_choice: w.ctx.player_choice,
                method: w.ctx.options.fallback_method,
                timeout_ms: w.ctx.options.timeout_ms,
                attempts: w.ctx.attempts,
                remaining_ms: timeout.saturating_sub(w.started.elapsed()).as_millis() as u64,
            }
        })
    }

    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }

    /// Cancel every outstanding watch. Used at shutdown.
    pub fn cleanup(&self) -> usize {
        let mut cancelled = 0;
        self.watches.retain(|_, _| {
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            tracing::info!(cancelled, "emergency watches cancelled");
        }
        cancelled
    }
}
