//! Domain models shared across vrfguard crates.

mod account;
mod chain;
mod classification;
pub mod config;
mod events;
mod queue;
mod round;

pub use account::{AccountHealth, AccountIdentity, HealthThresholds, HealthUpdate, OracleAccount};
pub use chain::{ChainStateAnchor, Confirmation, Operation, Signature};
pub use classification::{ErrorClassification, ErrorType, Severity, SuggestedAction};
pub use config::{
    EmergencyConfig, LeaderConfig, OracleAccountConfig, ProbeConfig, QueueConfig,
    ResilienceConfig, RetryConfig, SelectionStrategy, StatusConfig,
};
pub use events::{
    EmergencyEvent, EmergencyResolution, FallbackMethod, ResolutionMethod, StatusUpdate,
};
pub use queue::{
    EstimateConfidence, OracleAccountInfo, QueueEstimate, QueueHealth, QueueRecommendation,
    QueueSnapshot,
};
pub use round::{CoinSide, RoundPhase, RoundStatus, VrfStatus};
