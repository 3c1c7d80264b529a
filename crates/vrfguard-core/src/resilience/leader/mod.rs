//! Heartbeat-based leader election.
//!
//! Every node publishes a heartbeat on the shared [`PeerTransport`] each
//! interval and records the heartbeats it sees. The leader is the live node
//! with the lowest id, where live means a heartbeat within the timeout. A
//! node whose own publishes fail stops refreshing itself and so steps down.

mod transport;

#[cfg(test)]
mod tests;

pub use transport::{LocalPeerBus, PeerMessage, PeerTransport};

use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use vrfguard_types::LeaderConfig;

use crate::resilience::events::{EventBus, Subscription};
use crate::resilience::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadershipChange {
    pub node_id: String,
    pub is_leader: bool,
    pub leader: Option<String>,
}

pub struct LeaderElector {
    node_id: String,
    config: LeaderConfig,
    transport: Arc<dyn PeerTransport>,
    peers: DashMap<String, Instant>,
    is_leader: AtomicBool,
    leader: RwLock<Option<String>>,
    events: EventBus<LeadershipChange>,
    shutdown_tx: watch::Sender<bool>,
}

impl LeaderElector {
    pub fn new(config: LeaderConfig, transport: Arc<dyn PeerTransport>) -> Arc<Self> {
        Self::with_node_id(uuid::Uuid::new_v4().to_string(), config, transport)
    }

    pub fn with_node_id(
        node_id: impl Into<String>,
        config: LeaderConfig,
        transport: Arc<dyn PeerTransport>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            node_id: node_id.into(),
            config,
            transport,
            peers: DashMap::new(),
            is_leader: AtomicBool::new(false),
            leader: RwLock::new(None),
            events: EventBus::new(),
            shutdown_tx,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    pub fn current_leader(&self) -> Option<String> {
        self.leader.read().clone()
    }

    /// Nodes currently considered live, including this one.
    pub fn live_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|p| p.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn subscribe(&self) -> Subscription<LeadershipChange> {
        self.events.subscribe()
    }

    /// Start heartbeating and listening. Runs until [`LeaderElector::shutdown`].
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let elector = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);

        tokio::spawn(async move {
            let mut incoming = elector.transport.subscribe();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(node_id = %elector.node_id, "leader election started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => elector.heartbeat().await,
                    Some(message) = incoming.next() => elector.observe(&message),
                    _ = shutdown_rx.changed() => break,
                }
            }

            let goodbye = PeerMessage::Goodbye { node_id: elector.node_id.clone() };
            if let Err(e) = elector.transport.publish(goodbye).await {
                tracing::debug!("goodbye not delivered: {}", e);
            }
            elector.peers.clear();
            elector.evaluate();
            tracing::info!(node_id = %elector.node_id, "leader election stopped");
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn heartbeat(&self) {
        let message = PeerMessage::Heartbeat { node_id: self.node_id.clone() };
        match self.transport.publish(message).await {
            Ok(()) => {
                self.peers.insert(self.node_id.clone(), Instant::now());
            },
            Err(e) => tracing::warn!(node_id = %self.node_id, "heartbeat publish failed: {}", e),
        }
        self.evaluate();
    }

    /// Feed a message from the transport.
    pub fn observe(&self, message: &PeerMessage) {
        if message.sender() == self.node_id {
            return;
        }
        match message {
            PeerMessage::Heartbeat { node_id } => {
                self.peers.insert(node_id.clone(), Instant::now());
            },
            PeerMessage::Goodbye { node_id } => {
                self.peers.remove(node_id);
            },
            _ => return,
        }
        self.evaluate();
    }

    pub fn evaluate(&self) -> bool {
        self.evaluate_at(Instant::now())
    }

    /// Drop stale peers and recompute the leader as of `now`.
    pub fn evaluate_at(&self, now: Instant) -> bool {
        let timeout = Duration::from_millis(self.config.heartbeat_timeout_ms);
        self.peers.retain(|_, seen| now.saturating_duration_since(*seen) <= timeout);

        let leader = self.peers.iter().map(|p| p.key().clone()).min();
        let is_leader = leader.as_deref() == Some(self.node_id.as_str());
        let was_leader = self.is_leader.swap(is_leader, Ordering::SeqCst);
        *self.leader.write() = leader.clone();

        if was_leader != is_leader {
            if is_leader {
                tracing::info!(node_id = %self.node_id, "became leader");
            } else {
                tracing::info!(node_id = %self.node_id, leader = ?leader, "stepped down");
            }
            metrics::record_leadership_change(is_leader);
            self.events.publish(&LeadershipChange {
                node_id: self.node_id.clone(),
                is_leader,
                leader,
            });
        }
        is_leader
    }
}
