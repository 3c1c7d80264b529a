//! Operations submitted on-chain and the short-lived state they need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountIdentity;
use super::events::FallbackMethod;
use super::round::CoinSide;

/// Transaction signature returned by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recent ledger checkpoint a transaction must reference. Expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStateAnchor {
    pub anchor: String,
    pub valid_until: DateTime<Utc>,
}

impl ChainStateAnchor {
    pub fn new(anchor: impl Into<String>, valid_until: DateTime<Utc>) -> Self {
        Self { anchor: anchor.into(), valid_until }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Operation handed to the transaction submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Ask an oracle account for randomness for this round
    RequestRandomness { round_id: String, external_room_id: String, oracle: AccountIdentity },
    /// Settle the round with a locally decided outcome
    ResolveRound {
        round_id: String,
        external_room_id: String,
        outcome: CoinSide,
        method: FallbackMethod,
    },
    /// Return the stakes without a winner
    Refund { round_id: String, external_room_id: String },
}

impl Operation {
    pub fn round_id(&self) -> &str {
        match self {
            Self::RequestRandomness { round_id, .. }
            | Self::ResolveRound { round_id, .. }
            | Self::Refund { round_id, .. } => round_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestRandomness { .. } => "request_randomness",
            Self::ResolveRound { .. } => "resolve_round",
            Self::Refund { .. } => "refund",
        }
    }
}

/// Result of confirming a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed,
    OnChainError(String),
}
