//! Typed error definitions for vrfguard.
//!
//! - [`OracleFailure`]: what the transaction submitter or account loader
//!   reports back. Structured variants carry their own signal; free text ends
//!   up in [`OracleFailure::Other`] and is pattern-matched by the classifier.
//! - [`ConfigError`]: configuration loading and validation.
//! - [`RoundError`]: round lifecycle misuse (double start, late retry).

mod config;
mod oracle;
mod round;

pub use config::ConfigError;
pub use oracle::OracleFailure;
pub use round::RoundError;
