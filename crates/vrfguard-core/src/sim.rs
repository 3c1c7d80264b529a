//! In-process simulated oracle.
//!
//! Implements both capability traits so the whole resilience layer can run
//! without a chain: the CLI `simulate` command drives it with a seeded
//! random failure profile, tests drive it with a script of outcomes.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use vrfguard_types::{
    AccountIdentity, ChainStateAnchor, Confirmation, Operation, OracleAccountInfo, OracleFailure,
    QueueSnapshot, Signature,
};

use crate::resilience::traits::{OracleAccountLoader, TransactionSubmitter};

/// What the next randomness request does, overriding the random profile.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Fail(OracleFailure),
    /// Never returns; the caller's timeout has to fire.
    Hang,
    /// Lands, then fails confirmation with a program error.
    RejectOnChain(String),
}

#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Probability in [0, 1] that a randomness request fails
    pub failure_rate: f64,
    pub latency: Duration,
    /// Identities whose queue is paused
    pub offline: HashSet<String>,
    pub queue_capacity: u64,
    pub seed: u64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency: Duration::from_millis(50),
            offline: HashSet::new(),
            queue_capacity: 100,
            seed: 7,
        }
    }
}

pub struct SimulatedOracle {
    profile: SimulationProfile,
    rng: Mutex<StdRng>,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    submissions: Mutex<Vec<Operation>>,
    rejected: DashMap<String, String>,
    missing: DashSet<String>,
    queue_sizes: DashMap<String, u64>,
    anchors_issued: AtomicU64,
    signatures_issued: AtomicU64,
    fail_settlements: AtomicBool,
    hang_settlements: AtomicBool,
    loader_down: AtomicBool,
}

impl SimulatedOracle {
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(profile.seed)),
            profile,
            script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            rejected: DashMap::new(),
            missing: DashSet::new(),
            queue_sizes: DashMap::new(),
            anchors_issued: AtomicU64::new(0),
            signatures_issued: AtomicU64::new(0),
            fail_settlements: AtomicBool::new(false),
            hang_settlements: AtomicBool::new(false),
            loader_down: AtomicBool::new(false),
        }
    }

    /// Oracle that always succeeds immediately.
    pub fn reliable() -> Self {
        Self::new(SimulationProfile { latency: Duration::ZERO, ..SimulationProfile::default() })
    }

    pub fn push_script(&self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.script.lock().extend(outcomes);
    }

    pub fn submissions(&self) -> Vec<Operation> {
        self.submissions.lock().clone()
    }

    /// Submissions of one operation kind (`"request_randomness"`, ...).
    pub fn submission_count(&self, kind: &str) -> usize {
        self.submissions.lock().iter().filter(|op| op.name() == kind).count()
    }

    pub fn anchors_issued(&self) -> u64 {
        self.anchors_issued.load(Ordering::SeqCst)
    }

    pub fn set_fail_settlements(&self, fail: bool) {
        self.fail_settlements.store(fail, Ordering::SeqCst);
    }

    /// `ResolveRound` and `Refund` submissions never return.
    pub fn set_hang_settlements(&self, hang: bool) {
        self.hang_settlements.store(hang, Ordering::SeqCst);
    }

    pub fn set_loader_down(&self, down: bool) {
        self.loader_down.store(down, Ordering::SeqCst);
    }

    pub fn set_missing(&self, identity: &str) {
        self.missing.insert(identity.to_string());
    }

    pub fn set_queue_size(&self, queue: &str, size: u64) {
        self.queue_sizes.insert(queue.to_string(), size);
    }

    /// Queue the simulator assigns to an account identity.
    pub fn queue_for(identity: &str) -> String {
        format!("queue-{identity}")
    }

    fn next_signature(&self) -> Signature {
        let n = self.signatures_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Signature::new(format!("sim-{n:06}"))
    }

    fn random_failure(&self) -> Option<OracleFailure> {
        let mut rng = self.rng.lock();
        if !rng.gen_bool(self.profile.failure_rate.clamp(0.0, 1.0)) {
            return None;
        }
        let failure = match rng.gen_range(0..4) {
            0 => OracleFailure::QueueFull {
                queue_depth: Some(self.profile.queue_capacity),
                retry_after_ms: None,
            },
            1 => OracleFailure::other("connection reset by peer"),
            2 => OracleFailure::other("Transaction simulation failed: Blockhash not found"),
            _ => OracleFailure::Timeout { elapsed_ms: self.profile.latency.as_millis() as u64 },
        };
        Some(failure)
    }

    async fn request_randomness(&self, oracle: &AccountIdentity) -> Result<Signature, OracleFailure> {
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(ScriptedOutcome::Succeed) => return Ok(self.next_signature()),
            Some(ScriptedOutcome::Fail(failure)) => return Err(failure),
            Some(ScriptedOutcome::Hang) => {
                return std::future::pending::<Result<Signature, OracleFailure>>().await;
            },
            Some(ScriptedOutcome::RejectOnChain(message)) => {
                let signature = self.next_signature();
                self.rejected.insert(signature.0.clone(), message);
                return Ok(signature);
            },
            None => {},
        }

        if self.profile.offline.contains(oracle.as_str()) {
            return Err(OracleFailure::OracleOffline { reason: "queue paused".into() });
        }
        match self.random_failure() {
            Some(failure) => Err(failure),
            None => Ok(self.next_signature()),
        }
    }
}

#[async_trait]
impl TransactionSubmitter for SimulatedOracle {
    async fn submit(
        &self,
        operation: &Operation,
        _anchor: &ChainStateAnchor,
    ) -> Result<Signature, OracleFailure> {
        self.submissions.lock().push(operation.clone());
        if !self.profile.latency.is_zero() {
            tokio::time::sleep(self.profile.latency).await;
        }

        match operation {
            Operation::RequestRandomness { oracle, .. } => self.request_randomness(oracle).await,
            Operation::ResolveRound { .. } | Operation::Refund { .. }
                if self.hang_settlements.load(Ordering::SeqCst) =>
            {
                std::future::pending::<Result<Signature, OracleFailure>>().await
            },
            Operation::ResolveRound { .. } if self.fail_settlements.load(Ordering::SeqCst) => {
                Err(OracleFailure::on_chain("resolution rejected by program"))
            },
            Operation::ResolveRound { .. } | Operation::Refund { .. } => Ok(self.next_signature()),
        }
    }

    async fn confirm(
        &self,
        signature: &Signature,
        _anchor: &ChainStateAnchor,
    ) -> Result<Confirmation, OracleFailure> {
        Ok(match self.rejected.remove(signature.as_str()) {
            Some((_, message)) => Confirmation::OnChainError(message),
            None => Confirmation::Confirmed,
        })
    }

    async fn fresh_anchor(&self) -> Result<ChainStateAnchor, OracleFailure> {
        let n = self.anchors_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ChainStateAnchor::new(format!("anchor-{n}"), Utc::now() + chrono::Duration::seconds(60)))
    }
}

#[async_trait]
impl OracleAccountLoader for SimulatedOracle {
    async fn load(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Option<OracleAccountInfo>, OracleFailure> {
        if self.loader_down.load(Ordering::SeqCst) {
            return Err(OracleFailure::other("TypeError: fetch failed"));
        }
        if self.missing.contains(identity.as_str()) {
            return Ok(None);
        }
        let is_active = !self.profile.offline.contains(identity.as_str());
        Ok(Some(OracleAccountInfo {
            queue: Self::queue_for(identity.as_str()),
            status: if is_active { "active" } else { "paused" }.to_string(),
            is_active,
        }))
    }

    async fn load_queue(&self, queue: &str) -> Result<Option<QueueSnapshot>, OracleFailure> {
        if self.loader_down.load(Ordering::SeqCst) {
            return Err(OracleFailure::other("TypeError: fetch failed"));
        }
        Ok(Some(QueueSnapshot {
            queue: queue.to_string(),
            size: self.queue_sizes.get(queue).map_or(0, |s| *s),
            capacity: self.profile.queue_capacity,
            avg_time_per_position_ms: Some((self.profile.latency.as_millis() as u64).max(1)),
        }))
    }
}
