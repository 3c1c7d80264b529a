//! Round lifecycle errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum RoundError {
    /// An orchestrator run is already in flight for this round
    #[error("Round {round_id} already has an active randomness request")]
    AlreadyRunning { round_id: String },

    /// Manual retry was requested but the watch forbids it
    #[error("Manual retry is disabled for round {round_id}")]
    ManualRetryDisabled { round_id: String },

    /// The round reached a terminal status already
    #[error("Round {round_id} is already resolved")]
    AlreadyResolved { round_id: String },
}
