//! Emergency resolver defaults.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::events::FallbackMethod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Watchdog window per round in milliseconds
    #[validate(range(min = 1000_u64))]
    pub timeout_ms: u64,
    pub fallback_method: FallbackMethod,
    pub enable_manual_retry: bool,
    /// Bound on each fallback submission (`ResolveRound`, then `Refund`)
    #[validate(range(min = 100_u64))]
    pub settlement_timeout_ms: u64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            fallback_method: FallbackMethod::TimeoutWin,
            enable_manual_retry: true,
            settlement_timeout_ms: 10_000,
        }
    }
}
