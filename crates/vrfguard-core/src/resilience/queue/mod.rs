//! Advisory queue position and wait estimates.
//!
//! Nothing here gates selection; estimates feed status updates and the
//! operator CLI. Queue snapshots are cached for `cache_ttl_ms` and observed
//! waits are kept in a bounded rolling history per queue.


use dashmap::DashMap;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vrfguard_types::{
    EstimateConfidence, OracleAccount, QueueConfig, QueueEstimate, QueueHealth,
    QueueRecommendation, QueueSnapshot,
};

use crate::error::AppResult;
use crate::resilience::traits::OracleAccountLoader;

const BASE_WEIGHT: f64 = 0.7;
const HISTORY_WEIGHT: f64 = 0.3;
const CONGESTION_UTILIZATION: f64 = 0.7;
const HIGH_CONFIDENCE_SAMPLES: usize = 5;
/// Historical waits are normalized against this when scoring queues.
const WAIT_NORMALIZATION_MS: f64 = 60_000.0;

pub struct QueuePositionEstimator {
    loader: Arc<dyn OracleAccountLoader>,
    config: QueueConfig,
    cache: DashMap<String, (QueueSnapshot, Instant)>,
    history: DashMap<String, VecDeque<u64>>,
}

impl QueuePositionEstimator {
    pub fn new(loader: Arc<dyn OracleAccountLoader>, config: QueueConfig) -> Self {
        Self { loader, config, cache: DashMap::new(), history: DashMap::new() }
    }

    /// Estimate where a new request from `account` would land.
    ///
    /// Missing or inactive accounts report position 0.
    pub async fn estimate(&self, account: &OracleAccount) -> AppResult<QueueEstimate> {
        let Some(info) = self.loader.load(&account.identity).await? else {
            return Ok(QueueEstimate {
                account: account.name.clone(),
                queue: None,
                position: 0,
                queue_size: 0,
                utilization: 0.0,
                estimated_wait_ms: 0,
                confidence: EstimateConfidence::Low,
            });
        };
        let snapshot = self.snapshot(&info.queue).await?;
        let (queue_size, utilization, per_position) = snapshot.as_ref().map_or(
            (0, 0.0, self.config.avg_time_per_position_ms),
            |s| {
                (
                    s.size,
                    s.utilization(),
                    s.avg_time_per_position_ms.unwrap_or(self.config.avg_time_per_position_ms),
                )
            },
        );

        let position = if info.is_active { queue_size + 1 } else { 0 };
        let estimated_wait_ms =
            self.blend_wait(&info.queue, position.saturating_mul(per_position), utilization);

        Ok(QueueEstimate {
            account: account.name.clone(),
            queue: Some(info.queue.clone()),
            position,
            queue_size,
            utilization,
            estimated_wait_ms,
            confidence: self.confidence(&info.queue),
        })
    }

    /// `base` blended 70/30 with the historical average, then inflated
    /// above 70% utilization.
    fn blend_wait(&self, queue: &str, base_ms: u64, utilization: f64) -> u64 {
        let mut wait = match self.historical_average(queue) {
            Some(history) => base_ms as f64 * BASE_WEIGHT + history * HISTORY_WEIGHT,
            None => base_ms as f64,
        };
        if utilization > CONGESTION_UTILIZATION {
            wait *= 1.0 + (utilization - CONGESTION_UTILIZATION) * 2.0;
        }
        wait.round() as u64
    }

    fn confidence(&self, queue: &str) -> EstimateConfidence {
        match self.history.get(queue).map_or(0, |h| h.len()) {
            0 => EstimateConfidence::Low,
            n if n < HIGH_CONFIDENCE_SAMPLES => EstimateConfidence::Medium,
            _ => EstimateConfidence::High,
        }
    }

    /// Candidate with the lowest composite score: utilization (50%),
    /// historical wait (30%), plus a penalty for critical queues.
    ///
    /// `Ok(None)` when no candidate is active. Errors only when every
    /// candidate failed to load.
    pub async fn find_best_queue(
        &self,
        candidates: &[OracleAccount],
    ) -> AppResult<Option<QueueRecommendation>> {
        let results = join_all(candidates.iter().map(|account| self.score(account))).await;

        let mut best: Option<QueueRecommendation> = None;
        let mut last_error = None;
        let mut loaded = 0;
        for result in results {
            match result {
                Ok(Some(candidate)) => {
                    loaded += 1;
                    let better = best.as_ref().map_or(true, |current| {
                        candidate
                            .score
                            .total_cmp(&current.score)
                            .then(candidate.account.priority.cmp(&current.account.priority))
                            .is_lt()
                    });
                    if better {
                        best = Some(candidate);
                    }
                },
                Ok(None) => loaded += 1,
                Err(e) => {
                    tracing::debug!("queue candidate skipped: {}", e);
                    last_error = Some(e);
                },
            }
        }

        match last_error {
            Some(e) if loaded == 0 => Err(e),
            _ => Ok(best),
        }
    }

    async fn score(&self, account: &OracleAccount) -> AppResult<Option<QueueRecommendation>> {
        let Some(info) = self.loader.load(&account.identity).await? else {
            return Ok(None);
        };
        if !info.is_active {
            return Ok(None);
        }
        let Some(snapshot) = self.snapshot(&info.queue).await? else {
            return Ok(None);
        };

        let utilization = snapshot.utilization();
        let health = snapshot.health();
        let history = self.historical_average(&info.queue);
        let normalized_wait = history.map_or(0.0, |h| (h / WAIT_NORMALIZATION_MS).min(1.0));
        let penalty = if health == QueueHealth::Critical { 0.2 } else { 0.0 };
        let score = utilization * 0.5 + normalized_wait * 0.3 + penalty;

        let history_text = history
            .map_or_else(|| "no wait history".to_string(), |h| format!("avg wait {h:.0}ms"));
        Ok(Some(QueueRecommendation {
            account: account.clone(),
            queue: info.queue,
            score,
            reason: format!(
                "{health} queue at {:.0}% utilization ({}/{}), {history_text}",
                utilization * 100.0,
                snapshot.size,
                snapshot.capacity
            ),
        }))
    }

    async fn snapshot(&self, queue: &str) -> AppResult<Option<QueueSnapshot>> {
        let ttl = Duration::from_millis(self.config.cache_ttl_ms);
        if let Some(cached) = self.cache.get(queue) {
            if cached.1.elapsed() < ttl {
                return Ok(Some(cached.0.clone()));
            }
        }

        let snapshot = self.loader.load_queue(queue).await?;
        match &snapshot {
            Some(s) => {
                self.cache.insert(queue.to_string(), (s.clone(), Instant::now()));
            },
            None => {
                self.cache.remove(queue);
            },
        }
        Ok(snapshot)
    }

    /// Record how long a request on `queue` actually waited.
    pub fn record_observed_wait(&self, queue: &str, wait: Duration) {
        let mut samples = self.history.entry(queue.to_string()).or_default();
        samples.push_back(wait.as_millis() as u64);
        while samples.len() > self.config.history_limit {
            samples.pop_front();
        }
    }

    pub fn historical_average(&self, queue: &str) -> Option<f64> {
        let samples = self.history.get(queue)?;
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
    }

    /// Drop a cached snapshot so the next estimate reloads it.
    pub fn invalidate(&self, queue: &str) {
        self.cache.remove(queue);
    }
}
