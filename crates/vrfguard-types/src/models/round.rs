//! Public lifecycle record of a round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{ResolutionMethod, StatusUpdate};

/// Player choice and resolved outcome of a coin flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinSide {
    Heads,
    Tails,
}

impl CoinSide {
    /// Even bit is heads, odd bit is tails.
    pub const fn from_bit(bit: u8) -> Self {
        if bit % 2 == 0 {
            Self::Heads
        } else {
            Self::Tails
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Heads => Self::Tails,
            Self::Tails => Self::Heads,
        }
    }
}

impl std::fmt::Display for CoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heads => f.write_str("heads"),
            Self::Tails => f.write_str("tails"),
        }
    }
}

/// Status of the randomness request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VrfStatus {
    #[default]
    None,
    Pending,
    Fulfilled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl RoundPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle; updates never move a round to a lower rank.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Retrying => 2,
            Self::Completed | Self::Failed => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round_id: String,
    pub external_room_id: String,
    pub status: RoundPhase,
    pub account: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub time_elapsed_ms: u64,
    pub estimated_wait_ms: Option<u64>,
    pub queue_position: Option<u64>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub vrf_status: VrfStatus,
    #[serde(default)]
    pub outcome: Option<CoinSide>,
    #[serde(default)]
    pub resolution: Option<ResolutionMethod>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl RoundStatus {
    pub fn new(
        round_id: impl Into<String>,
        external_room_id: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            round_id: round_id.into(),
            external_room_id: external_room_id.into(),
            status: RoundPhase::Pending,
            account: None,
            attempt: 0,
            max_attempts,
            time_elapsed_ms: 0,
            estimated_wait_ms: None,
            queue_position: None,
            error: None,
            start_time: now,
            last_update: now,
            vrf_status: VrfStatus::None,
            outcome: None,
            resolution: None,
            signature: None,
        }
    }

    /// Fold an orchestrator event into this record.
    ///
    /// Returns `false` (and changes nothing) when the update would move the
    /// round backwards or the round is already terminal.
    pub fn apply_update(&mut self, update: &StatusUpdate) -> bool {
        if !self.status.can_advance_to(update.status) {
            return false;
        }
        self.status = update.status;
        self.attempt = self.attempt.max(update.attempt);
        if update.account.is_some() {
            self.account.clone_from(&update.account);
        }
        self.error.clone_from(&update.error);
        self.time_elapsed_ms = update.time_elapsed_ms;
        if update.estimated_wait_ms.is_some() {
            self.estimated_wait_ms = update.estimated_wait_ms;
        }
        if update.queue_position.is_some() {
            self.queue_position = update.queue_position;
        }
        self.vrf_status = match (update.status, update.success) {
            (RoundPhase::Completed, _) | (_, Some(true)) => VrfStatus::Fulfilled,
            (RoundPhase::Failed, _) | (_, Some(false)) => VrfStatus::Failed,
            _ => VrfStatus::Pending,
        };
        self.last_update = Utc::now();
        true
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.start_time).num_milliseconds()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: RoundPhase, attempt: u32) -> StatusUpdate {
        StatusUpdate {
            status,
            attempt,
            account: Some("alpha".into()),
            error: None,
            time_elapsed_ms: 10,
            estimated_wait_ms: None,
            queue_position: None,
            success: None,
        }
    }

    #[test]
    fn test_lifecycle_never_regresses() {
        let mut round = RoundStatus::new("r1", "room", 3);
        assert!(round.apply_update(&update(RoundPhase::Processing, 1)));
        assert!(round.apply_update(&update(RoundPhase::Retrying, 2)));
        assert!(round.apply_update(&update(RoundPhase::Retrying, 3)));
        assert!(!round.apply_update(&update(RoundPhase::Processing, 4)));
        assert_eq!(round.status, RoundPhase::Retrying);
        assert_eq!(round.attempt, 3);

        assert!(round.apply_update(&update(RoundPhase::Completed, 3)));
        assert!(!round.apply_update(&update(RoundPhase::Failed, 3)));
        assert_eq!(round.status, RoundPhase::Completed);
        assert_eq!(round.vrf_status, VrfStatus::Fulfilled);
    }

    #[test]
    fn test_coin_side_from_bit() {
        assert_eq!(CoinSide::from_bit(0), CoinSide::Heads);
        assert_eq!(CoinSide::from_bit(1), CoinSide::Tails);
        assert_eq!(CoinSide::from_bit(254), CoinSide::Heads);
        assert_eq!(CoinSide::Heads.opposite(), CoinSide::Tails);
    }
}
