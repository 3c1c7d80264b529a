//! # vrfguard Core
//!
//! Resilience layer that gets every wagering round resolved even when the
//! randomness oracle is congested, slow or unreachable.
//!
//! ## Architecture
//!
//! ```text
//! vrfguard-core/src/
//! ├── modules/config.rs        # JSON config loading (atomic save)
//! ├── resilience/
//! │   ├── registry/            # Oracle accounts, health, quarantine, probe
//! │   ├── classifier/          # Failure -> ErrorClassification
//! │   ├── orchestrator/        # Attempts, rotation, backoff, anchor refresh
//! │   ├── emergency/           # Per-round watchdog and fallback outcome
//! │   ├── status/              # Round lifecycle, history, stats, broadcast
//! │   ├── leader/              # Heartbeat election over a PeerTransport
//! │   ├── queue/               # Advisory queue wait estimates
//! │   └── coordinator.rs       # Wires one round through all of the above
//! └── sim.rs                   # In-process simulated oracle
//! ```
//!
//! Every component is constructed explicitly and shared through `Arc`;
//! there is no global state besides the optional Prometheus recorder.

#![allow(
    clippy::significant_drop_tightening,
    reason = "DashMap guards are scoped explicitly where it matters"
)]
#![cfg_attr(
    test,
    allow(clippy::panic, clippy::float_cmp, clippy::unwrap_used, clippy::expect_used)
)]

pub mod error;
pub mod modules;
pub mod resilience;
pub mod sim;

pub use error::{AppError, AppResult};
pub use resilience::{
    AccountRegistry, EmergencyResolver, ErrorClassifier, EventBus, HealthProbe, LeaderElector,
    LocalPeerBus, OracleAccountLoader, PeerMessage, PeerTransport, QueuePositionEstimator,
    RetryOptions, RetryOrchestrator, RoundCoordinator, RoundRequest, StatusTracker, Subscription,
    TransactionSubmitter,
};
