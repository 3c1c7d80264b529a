//! Events emitted to the UI layer and the cross-process broadcaster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::round::{CoinSide, RoundPhase};

/// Progress report emitted by the retry orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: RoundPhase,
    pub attempt: u32,
    pub account: Option<String>,
    pub error: Option<String>,
    pub time_elapsed_ms: u64,
    pub estimated_wait_ms: Option<u64>,
    pub queue_position: Option<u64>,
    pub success: Option<bool>,
}

/// How a round is resolved when the oracle path does not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMethod {
    /// SHA-256 of round, room and time
    Deterministic,
    /// Local OS randomness, weak randomness if unavailable
    ClientRandom,
    /// The player's own choice wins
    #[default]
    TimeoutWin,
}

impl std::fmt::Display for FallbackMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deterministic => f.write_str("deterministic"),
            Self::ClientRandom => f.write_str("client_random"),
            Self::TimeoutWin => f.write_str("timeout_win"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Oracle,
    Emergency,
    ManualRetry,
    Timeout,
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oracle => f.write_str("oracle"),
            Self::Emergency => f.write_str("emergency"),
            Self::ManualRetry => f.write_str("manual_retry"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResolution {
    pub round_id: String,
    pub resolved: bool,
    pub method: ResolutionMethod,
    pub result: Option<CoinSide>,
    pub signature: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EmergencyEvent {
    MonitoringStarted {
        round_id: String,
        external_room_id: String,
        timeout_ms: u64,
        method: FallbackMethod,
    },
    MonitoringStopped {
        round_id: String,
        external_room_id: String,
        timeout_ms: u64,
        method: FallbackMethod,
    },
    Resolution(EmergencyResolution),
}

impl EmergencyEvent {
    pub fn round_id(&self) -> &str {
        match self {
            Self::MonitoringStarted { round_id, .. } | Self::MonitoringStopped { round_id, .. } => {
                round_id
            },
            Self::Resolution(resolution) => &resolution.round_id,
        }
    }

    /// Terminal events settle the round; at most one is emitted per round.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Resolution(EmergencyResolution {
                method: ResolutionMethod::Oracle | ResolutionMethod::Emergency,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fallback_is_player_favourable() {
        assert_eq!(FallbackMethod::default(), FallbackMethod::TimeoutWin);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = EmergencyEvent::MonitoringStarted {
            round_id: "r1".into(),
            external_room_id: "room".into(),
            timeout_ms: 60_000,
            method: FallbackMethod::Deterministic,
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["event"], "monitoring_started");
        assert_eq!(json["method"], "deterministic");
    }
}
