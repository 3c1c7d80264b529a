//! Round lifecycle tracking.
//!
//! Folds orchestrator [`StatusUpdate`]s and emergency completions into one
//! [`RoundStatus`] per round, keeps a bounded per-round history, and
//! publishes every change on a local [`EventBus`]. With a [`PeerTransport`]
//! attached, changes are also broadcast to other processes, but only while
//! this node is the elected leader.
//!
//! Terminal rounds leave the active view after `cleanup_grace_ms`; their
//! history is kept until `history_retention_ms`.

mod stats;


pub use stats::{LoadLevel, TrackerStats};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vrfguard_types::{
    CoinSide, ResolutionMethod, RoundPhase, RoundStatus, StatusConfig, StatusUpdate, VrfStatus,
};

use crate::resilience::events::{EventBus, Subscription};
use crate::resilience::leader::{LeaderElector, PeerMessage, PeerTransport};
use crate::resilience::registry::AccountRegistry;
use crate::resilience::scheduler::ScheduledTask;
use stats::CompletionTotals;

/// Terminal report for [`StatusTracker::complete_game`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub success: bool,
    pub outcome: Option<CoinSide>,
    pub method: ResolutionMethod,
    pub signature: Option<String>,
    pub error: Option<String>,
}

/// Outgoing peer messages go through one queue drained by a single
/// forwarding task, so the transport sees them in publish order.
struct PeerLink {
    node_id: String,
    transport: Arc<dyn PeerTransport>,
    outbox: mpsc::UnboundedSender<PeerMessage>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<PeerMessage>>>,
}

impl PeerLink {
    fn new(node_id: String, transport: Arc<dyn PeerTransport>) -> Self {
        let (outbox, rx) = mpsc::unbounded_channel();
        Self { node_id, transport, outbox, pending: Mutex::new(Some(rx)) }
    }

    /// Start the forwarder on first use inside a runtime. Messages queued
    /// earlier are delivered once it runs.
    fn ensure_forwarder(&self) {
        let mut pending = self.pending.lock();
        if pending.is_none() || tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let Some(mut rx) = pending.take() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = transport.publish(message).await {
                    tracing::warn!("status broadcast failed: {}", e);
                }
            }
        });
    }

    fn send(&self, message: PeerMessage) {
        self.ensure_forwarder();
        if self.outbox.send(message).is_err() {
            tracing::debug!("peer outbox closed, message dropped");
        }
    }
}

pub struct StatusTracker {
    config: StatusConfig,
    rounds: Arc<DashMap<String, RoundStatus>>,
    history: Arc<DashMap<String, VecDeque<RoundStatus>>>,
    cleanups: Arc<DashMap<String, Vec<ScheduledTask>>>,
    totals: Mutex<CompletionTotals>,
    registry: Option<Arc<AccountRegistry>>,
    peer: Option<PeerLink>,
    is_leader: AtomicBool,
    events: EventBus<RoundStatus>,
}

impl StatusTracker {
    /// Standalone tracker. Without a transport the process is its own leader.
    pub fn new(config: StatusConfig) -> Self {
        Self {
            config,
            rounds: Arc::new(DashMap::new()),
            history: Arc::new(DashMap::new()),
            cleanups: Arc::new(DashMap::new()),
            totals: Mutex::new(CompletionTotals::default()),
            registry: None,
            peer: None,
            is_leader: AtomicBool::new(true),
            events: EventBus::new(),
        }
    }

    /// Account totals in [`StatusTracker::stats`] come from this registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<AccountRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attach a cross-process transport. The node starts as a follower.
    #[must_use]
    pub fn with_peer_transport(
        mut self,
        node_id: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        self.peer = Some(PeerLink::new(node_id.into(), transport));
        self.is_leader = AtomicBool::new(false);
        self
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn subscribe(&self) -> Subscription<RoundStatus> {
        self.events.subscribe()
    }

    /// Begin tracking a round in `pending`. An active round is returned
    /// unchanged; a terminal one is re-armed.
    pub fn start_tracking(
        &self,
        round_id: &str,
        external_room_id: &str,
        max_attempts: u32,
    ) -> RoundStatus {
        if let Some(existing) = self.rounds.get(round_id) {
            if !existing.status.is_terminal() {
                return existing.clone();
            }
        }

        self.cleanups.remove(round_id);
        let status = RoundStatus::new(round_id, external_room_id, max_attempts);
        self.rounds.insert(round_id.to_string(), status.clone());
        self.history.remove(round_id);
        self.push_history(&status);
        tracing::debug!(round_id = %round_id, max_attempts, "tracking round");
        self.broadcast(&status);
        status
    }

    /// Apply an orchestrator update. Returns `false` for unknown rounds and
    /// for updates that would move the round backwards.
    pub fn apply_update(&self, round_id: &str, update: &StatusUpdate) -> bool {
        let status = {
            let Some(mut round) = self.rounds.get_mut(round_id) else {
                tracing::debug!(round_id = %round_id, "update for untracked round dropped");
                return false;
            };
            if !round.apply_update(update) {
                tracing::debug!(
                    round_id = %round_id,
                    from = %round.status,
                    to = %update.status,
                    "out-of-order status update ignored"
                );
                return false;
            }
            round.clone()
        };

        self.push_history(&status);
        if status.status.is_terminal() {
            self.finish(&status);
        }
        self.broadcast(&status);
        true
    }

    /// Mark a round terminal. Untracked rounds are recorded on the spot.
    ///
    /// Returns `false` when the round was already terminal.
    pub fn complete_game(&self, round_id: &str, report: CompletionReport) -> bool {
        let status = {
            let mut round = self
                .rounds
                .entry(round_id.to_string())
                .or_insert_with(|| RoundStatus::new(round_id, "", 0));
            if round.status.is_terminal() {
                return false;
            }
            let now = Utc::now();
            round.status = if report.success { RoundPhase::Completed } else { RoundPhase::Failed };
            round.outcome = report.outcome;
            round.resolution = Some(report.method);
            round.signature = report.signature;
            round.error = report.error;
            round.vrf_status = match (report.method, report.success) {
                (ResolutionMethod::Oracle, true) => VrfStatus::Fulfilled,
                _ => VrfStatus::Failed,
            };
            round.time_elapsed_ms = round.age_ms(now);
            round.last_update = now;
            round.clone()
        };

        tracing::info!(
            round_id = %round_id,
            status = %status.status,
            method = %report.method,
            elapsed_ms = status.time_elapsed_ms,
            "round finished"
        );
        self.push_history(&status);
        self.finish(&status);
        self.broadcast(&status);
        true
    }

    fn finish(&self, status: &RoundStatus) {
        self.totals
            .lock()
            .record(status.status == RoundPhase::Completed, status.time_elapsed_ms);
        self.schedule_cleanup(&status.round_id);
        self.share_account_health(status.account.as_deref());
    }

    fn schedule_cleanup(&self, round_id: &str) {
        let mut tasks = Vec::with_capacity(2);

        let rounds = Arc::clone(&self.rounds);
        let key = round_id.to_string();
        tasks.extend(ScheduledTask::try_after(
            Duration::from_millis(self.config.cleanup_grace_ms),
            async move {
                rounds.remove_if(&key, |_, round| round.status.is_terminal());
            },
        ));

        let history = Arc::clone(&self.history);
        let cleanups = Arc::clone(&self.cleanups);
        let key = round_id.to_string();
        tasks.extend(ScheduledTask::try_after(
            Duration::from_millis(self.config.history_retention_ms),
            async move {
                history.remove(&key);
                if let Some((_, tasks)) = cleanups.remove(&key) {
                    tasks.into_iter().for_each(ScheduledTask::detach);
                }
            },
        ));

        self.cleanups.insert(round_id.to_string(), tasks);
    }

    fn push_history(&self, status: &RoundStatus) {
        let mut entries = self.history.entry(status.round_id.clone()).or_default();
        entries.push_back(status.clone());
        while entries.len() > self.config.history_limit {
            entries.pop_front();
        }
    }

    pub fn get(&self, round_id: &str) -> Option<RoundStatus> {
        self.rounds.get(round_id).map(|r| r.clone())
    }

    /// Non-terminal rounds, oldest first.
    pub fn active_rounds(&self) -> Vec<RoundStatus> {
        let mut rounds: Vec<RoundStatus> = self
            .rounds
            .iter()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.clone())
            .collect();
        rounds.sort_by_key(|r| r.start_time);
        rounds
    }

    /// Every round still in view, terminal ones included.
    pub fn all_rounds(&self) -> Vec<RoundStatus> {
        let mut rounds: Vec<RoundStatus> = self.rounds.iter().map(|r| r.clone()).collect();
        rounds.sort_by_key(|r| r.start_time);
        rounds
    }

    pub fn history(&self, round_id: &str) -> Vec<RoundStatus> {
        self.history.get(round_id).map(|h| h.iter().cloned().collect()).unwrap_or_default()
    }

    /// Active rounds older than `threshold`.
    pub fn slow_rounds(&self, threshold: Duration) -> Vec<RoundStatus> {
        let now = Utc::now();
        let threshold_ms = threshold.as_millis() as u64;
        self.active_rounds().into_iter().filter(|r| r.age_ms(now) > threshold_ms).collect()
    }

    pub fn stats(&self) -> TrackerStats {
        let totals = *self.totals.lock();
        let (healthy_accounts, total_accounts) = self
            .registry
            .as_ref()
            .map_or((0, 0), |r| (r.healthy_count(), r.accounts().len()));
        let active_rounds = self.rounds.iter().filter(|r| !r.status.is_terminal()).count();

        TrackerStats {
            healthy_accounts,
            total_accounts,
            active_rounds,
            completed_rounds: totals.completed,
            failed_rounds: totals.failed,
            average_processing_ms: totals.average_processing_ms(),
            success_rate: totals.success_rate(),
            load: LoadLevel::from_ratio(active_rounds, healthy_accounts),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// On gaining leadership the full active view is re-broadcast so
    /// followers resynchronize.
    pub fn set_leader(&self, is_leader: bool) {
        let was_leader = self.is_leader.swap(is_leader, Ordering::SeqCst);
        if is_leader && !was_leader {
            if let Some(peer) = &self.peer {
                let rounds = self.active_rounds();
                tracing::info!(rounds = rounds.len(), "publishing status snapshot as leader");
                self.publish_peer(PeerMessage::StatusSnapshot {
                    node_id: peer.node_id.clone(),
                    rounds,
                });
            }
        }
    }

    /// Mirror an elector's leadership into this tracker until it stops.
    pub fn follow_leadership(self: &Arc<Self>, elector: &LeaderElector) -> JoinHandle<()> {
        let mut changes = elector.subscribe();
        self.set_leader(elector.is_leader());
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                tracker.set_leader(change.is_leader);
            }
        })
    }

    /// Apply remote status from the transport until it closes. `None`
    /// without a transport.
    pub fn start_peer_sync(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut incoming = self.peer.as_ref()?.transport.subscribe();
        let tracker = Arc::clone(self);
        Some(tokio::spawn(async move {
            while let Some(message) = incoming.next().await {
                tracker.apply_remote(&message);
            }
        }))
    }

    /// Merge a peer message into the local view. Returns how many rounds or
    /// accounts changed. Leaders ignore remote status.
    pub fn apply_remote(&self, message: &PeerMessage) -> usize {
        if self.peer.as_ref().is_some_and(|p| p.node_id == message.sender()) {
            return 0;
        }
        match message {
            PeerMessage::StatusUpdate { round, .. } if !self.is_leader() => {
                usize::from(self.merge_remote_round(round))
            },
            PeerMessage::StatusSnapshot { rounds, .. } if !self.is_leader() => {
                rounds.iter().filter(|round| self.merge_remote_round(round)).count()
            },
            PeerMessage::AccountHealth { account, health, .. } => self
                .registry
                .as_ref()
                .map_or(0, |r| usize::from(r.merge_remote_health(account, health))),
            _ => 0,
        }
    }

    fn merge_remote_round(&self, remote: &RoundStatus) -> bool {
        let merged = match self.rounds.entry(remote.round_id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(remote.clone());
                true
            },
            Entry::Occupied(mut entry) => {
                let local = entry.get_mut();
                let newer = *local != *remote
                    && local.status.can_advance_to(remote.status)
                    && remote.last_update >= local.last_update;
                if newer {
                    *local = remote.clone();
                }
                newer
            },
        };
        if merged {
            self.push_history(remote);
            if remote.status.is_terminal() {
                self.schedule_cleanup(&remote.round_id);
            }
            self.events.publish(remote);
        }
        merged
    }

    fn broadcast(&self, status: &RoundStatus) {
        self.events.publish(status);
        if let Some(peer) = &self.peer {
            if self.is_leader() {
                self.publish_peer(PeerMessage::StatusUpdate {
                    node_id: peer.node_id.clone(),
                    round: status.clone(),
                });
            }
        }
    }

    fn share_account_health(&self, account: Option<&str>) {
        let (Some(peer), Some(registry), Some(account)) = (&self.peer, &self.registry, account)
        else {
            return;
        };
        if let Some(health) = registry.health(account) {
            self.publish_peer(PeerMessage::AccountHealth {
                node_id: peer.node_id.clone(),
                account: account.to_string(),
                health,
            });
        }
    }

    fn publish_peer(&self, message: PeerMessage) {
        if let Some(peer) = &self.peer {
            peer.send(message);
        }
    }
}
