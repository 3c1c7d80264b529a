//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Configuration file could not be read or written
    #[error("Config I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// Configuration file is not valid JSON for the schema
    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    /// A field failed validation
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// The emergency window would fire before the retry budget is spent
    #[error(
        "Emergency window ({emergency_ms}ms) does not exceed the retry budget ({budget_ms}ms)"
    )]
    EmergencyWindowTooShort { emergency_ms: u64, budget_ms: u64 },
}
