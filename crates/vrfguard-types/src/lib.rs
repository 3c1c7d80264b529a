//! # vrfguard Types
//!
//! Core types, events, configuration and error definitions for vrfguard.
//!
//! This crate provides the foundational type system shared by the resilience
//! layer and its consumers (UI bridges, cross-process broadcasters, CLI):
//!
//! - **`error`** - Typed errors for oracle calls, configuration and rounds
//! - **`models`** - Oracle accounts, health, classifications, round status,
//!   chain operations, queue snapshots and emitted events
//! - **`models::config`** - `ResilienceConfig` and its validated sections
//!
//! ## Architecture Role
//!
//! ```text
//!          vrfguard-types (this crate)
//!                  │
//!                  ▼
//!            vrfguard-core
//!                  │
//!                  ▼
//!            vrfguard-cli
//! ```
//!
//! All types are serializable so they can cross a process boundary unchanged.

pub mod error;
pub mod models;

pub use error::{ConfigError, OracleFailure, RoundError};

pub use models::{
    AccountHealth, AccountIdentity, ChainStateAnchor, CoinSide, Confirmation, EmergencyConfig,
    EmergencyEvent, EmergencyResolution, ErrorClassification, ErrorType, EstimateConfidence,
    FallbackMethod, HealthThresholds, HealthUpdate, LeaderConfig, Operation, OracleAccount,
    OracleAccountConfig, OracleAccountInfo, ProbeConfig, QueueConfig, QueueEstimate, QueueHealth,
    QueueRecommendation, QueueSnapshot, ResilienceConfig, ResolutionMethod, RetryConfig,
    RoundPhase, RoundStatus, SelectionStrategy, Severity, Signature, StatusConfig, StatusUpdate,
    SuggestedAction, VrfStatus,
};
