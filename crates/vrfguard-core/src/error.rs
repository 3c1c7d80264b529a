//! Unified error type for vrfguard core.

use serde::Serialize;
use thiserror::Error;
use vrfguard_types::models::ErrorType;
use vrfguard_types::{ConfigError, OracleFailure, RoundError};

/// Main error type for resilience-layer operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Raw failure from the submitter or account loader.
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleFailure),

    /// Round lifecycle misuse.
    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    /// Every registered account is quarantined.
    #[error("No selectable oracle account: {0}")]
    NoSelectableAccount(String),

    /// Too few usable accounts remain; the round must take the emergency path.
    #[error("All oracle accounts failing after {consecutive_failures} consecutive failures; emergency fallback required")]
    AllAccountsFailing { consecutive_failures: u32 },

    /// The attempt budget ran out.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The failure cannot be fixed by retrying (user rejection, funds, auth).
    #[error("Non-retryable {error_type} failure: {message}")]
    NonRetryable { error_type: ErrorType, message: String },

    /// No state is tracked for this round.
    #[error("Unknown round: {0}")]
    UnknownRound(String),

    /// Peer transport is closed or refused the message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unclassified error with message.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Whether this failure means the round should go straight to the
    /// emergency path instead of waiting for the watchdog.
    pub const fn requires_emergency(&self) -> bool {
        matches!(self, Self::AllAccountsFailing { .. } | Self::NoSelectableAccount(_))
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for vrfguard operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Unknown(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_message() {
        let err = AppError::AllAccountsFailing { consecutive_failures: 4 };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("emergency fallback required"));
        assert!(err.requires_emergency());
    }

    #[test]
    fn test_from_oracle_failure() {
        let err: AppError = OracleFailure::other("boom").into();
        assert!(matches!(err, AppError::Oracle(OracleFailure::Other { .. })));
        assert!(!err.requires_emergency());
    }
}
