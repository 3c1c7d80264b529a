//! Structured classification of oracle failures.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Timeout,
    QueueFull,
    OracleOffline,
    Network,
    AccountInvalid,
    Unknown,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::QueueFull => "queue_full",
            Self::OracleOffline => "oracle_offline",
            Self::Network => "network",
            Self::AccountInvalid => "account_invalid",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Retry,
    SwitchAccount,
    Fallback,
    Abort,
}

/// Produced fresh for every failure; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub is_retryable: bool,
    pub suggested_action: SuggestedAction,
    pub wait_time_ms: u64,
    pub message: String,
}

impl ErrorClassification {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Whether the orchestrator should stop without spending retry budget.
    pub fn should_abort(&self) -> bool {
        !self.is_retryable || self.suggested_action == SuggestedAction::Abort
    }
}
