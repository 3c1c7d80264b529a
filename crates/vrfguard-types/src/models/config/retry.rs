//! Retry orchestrator defaults.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How the registry picks an account for the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    RoundRobin,
    #[default]
    HealthBased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    /// Per-attempt timeout in milliseconds
    #[validate(range(min = 100_u64))]
    pub timeout_ms: u64,
    /// Total attempts per orchestrator run
    #[validate(range(min = 1_u32, max = 20_u32))]
    pub max_retries: u32,
    #[validate(range(min = 1_u64))]
    pub base_delay_ms: u64,
    #[validate(range(min = 1_u64))]
    pub max_delay_ms: u64,
    pub rotate_accounts_on_failure: bool,
    pub selection_strategy: SelectionStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            rotate_accounts_on_failure: true,
            selection_strategy: SelectionStrategy::HealthBased,
        }
    }
}

impl RetryConfig {
    /// Upper jitter bound applied to backoff delays (+20%).
    pub const JITTER_FACTOR: f64 = 0.2;

    pub fn worst_case_budget_ms(&self) -> u64 {
        let attempts = u64::from(self.max_retries);
        let mut budget = attempts.saturating_mul(self.timeout_ms);
        for retry in 1..self.max_retries {
            let exp = self.base_delay_ms.saturating_mul(1_u64 << (retry - 1).min(30));
            let jittered = (exp as f64 * (1.0 + Self::JITTER_FACTOR)).ceil() as u64;
            budget = budget.saturating_add(jittered.min(self.max_delay_ms));
        }
        budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_case_budget() {
        let config = RetryConfig::default();
        // 3 × 10s + 1.2s + 2.4s
        assert_eq!(config.worst_case_budget_ms(), 33_600);
    }

    #[test]
    fn test_budget_respects_max_delay() {
        let config = RetryConfig { max_retries: 4, max_delay_ms: 2000, ..RetryConfig::default() };
        // 4 × 10s + 1.2s + 2s + 2s
        assert_eq!(config.worst_case_budget_ms(), 45_200);
    }
}
