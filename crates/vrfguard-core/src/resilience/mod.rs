//! Oracle resilience layer.
//!
//! ```text
//! RoundCoordinator
//!   ├── RetryOrchestrator ──► AccountRegistry ──► ErrorClassifier
//!   │         │                     ▲
//!   │         ▼                     │
//!   │   TransactionSubmitter    HealthProbe ──► OracleAccountLoader
//!   ├── EmergencyResolver ──► StatusTracker ──► PeerTransport
//!   └── (advisory) QueuePositionEstimator          ▲
//!                                             LeaderElector
//! ```

pub mod classifier;
pub mod coordinator;
pub mod emergency;
pub mod events;
pub mod leader;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod traits;

pub use classifier::ErrorClassifier;
pub use coordinator::{RoundCoordinator, RoundRequest};
pub use emergency::{EmergencyOptions, EmergencyResolver};
pub use events::{EventBus, Subscription};
pub use leader::{LeaderElector, LeadershipChange, LocalPeerBus, PeerMessage, PeerTransport};
pub use orchestrator::{OrchestrationReport, RetryOptions, RetryOrchestrator, StatusCallback};
pub use queue::QueuePositionEstimator;
pub use registry::{AccountRegistry, AccountView, HealthProbe, ProbeReport};
pub use scheduler::ScheduledTask;
pub use status::{CompletionReport, LoadLevel, StatusTracker, TrackerStats};
pub use traits::{OracleAccountLoader, TransactionSubmitter};
