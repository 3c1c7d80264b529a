//! Cross-process message channel between resolver instances.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use vrfguard_types::{AccountHealth, RoundStatus};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    Heartbeat { node_id: String },
    /// Sent on orderly shutdown so peers re-elect without waiting out the timeout
    Goodbye { node_id: String },
    /// Full set of active rounds, published by a node that just became leader
    StatusSnapshot { node_id: String, rounds: Vec<RoundStatus> },
    StatusUpdate { node_id: String, round: RoundStatus },
    AccountHealth { node_id: String, account: String, health: AccountHealth },
}

impl PeerMessage {
    pub fn sender(&self) -> &str {
        match self {
            Self::Heartbeat { node_id }
            | Self::Goodbye { node_id }
            | Self::StatusSnapshot { node_id, .. }
            | Self::StatusUpdate { node_id, .. }
            | Self::AccountHealth { node_id, .. } => node_id,
        }
    }
}

/// Publish/subscribe channel shared by every resolver instance.
///
/// Messages published by a node may be echoed back to it; receivers filter
/// on [`PeerMessage::sender`].
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn publish(&self, message: PeerMessage) -> AppResult<()>;

    fn subscribe(&self) -> BoxStream<'static, PeerMessage>;
}

/// In-process transport over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalPeerBus {
    tx: broadcast::Sender<PeerMessage>,
}

impl LocalPeerBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

impl Default for LocalPeerBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl PeerTransport for LocalPeerBus {
    async fn publish(&self, message: PeerMessage) -> AppResult<()> {
        // No receivers is not a failure: the peer set is simply empty.
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(message)
            .map(|_| ())
            .map_err(|e| AppError::Transport(format!("peer bus closed: {e}")))
    }

    fn subscribe(&self) -> BoxStream<'static, PeerMessage> {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|message| match message {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("peer bus receiver lagged: {}", e);
                None
            },
        });
        Box::pin(stream)
    }
}
