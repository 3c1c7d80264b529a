//! Failures reported by the oracle-facing capabilities.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by a transaction submitter or oracle account loader.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum OracleFailure {
    /// The call did not complete within its deadline
    #[error("Request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time spent before giving up
        elapsed_ms: u64,
    },

    /// The oracle queue refused the request
    #[error("Oracle queue full{}{}",
        queue_depth.map(|d| format!(" (depth {})", d)).unwrap_or_default(),
        retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    QueueFull {
        /// Reported queue depth, if known
        queue_depth: Option<u64>,
        /// Provider hint for when to retry
        retry_after_ms: Option<u64>,
    },

    /// The oracle (or its queue) is not servicing requests
    #[error("Oracle offline: {reason}")]
    OracleOffline {
        /// Provider-supplied reason
        reason: String,
    },

    /// The oracle account is unusable (wrong owner, closed, not found)
    #[error("Oracle account invalid: {reason}")]
    AccountInvalid {
        /// Details about the invalid account
        reason: String,
    },

    /// The player declined to sign
    #[error("Transaction rejected by user")]
    UserRejected,

    /// The fee payer cannot cover the transaction
    #[error("Insufficient funds: {message}")]
    InsufficientFunds {
        /// Details from the submitter
        message: String,
    },

    /// Transaction landed but the program returned an error
    #[error("On-chain error: {message}")]
    OnChain {
        /// Program log / error message
        message: String,
    },

    /// Unstructured failure; only the text is known
    #[error("{message}")]
    Other {
        /// Raw error text
        message: String,
    },
}

impl OracleFailure {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other { message: message.into() }
    }

    pub fn on_chain(message: impl Into<String>) -> Self {
        Self::OnChain { message: message.into() }
    }

    /// Failures caused by the player or their wallet; retrying cannot help.
    pub const fn is_user_abort(&self) -> bool {
        matches!(self, Self::UserRejected | Self::InsufficientFunds { .. })
    }
}

impl From<String> for OracleFailure {
    fn from(message: String) -> Self {
        Self::Other { message }
    }
}

impl From<&str> for OracleFailure {
    fn from(message: &str) -> Self {
        Self::Other { message: message.to_string() }
    }
}
