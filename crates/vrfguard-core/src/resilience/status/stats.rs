//! Aggregate statistics over tracked rounds.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Low,
    Medium,
    High,
}

impl LoadLevel {
    /// Active rounds per healthy account: up to 1 is low, up to 3 medium.
    pub fn from_ratio(active_rounds: usize, healthy_accounts: usize) -> Self {
        let ratio = active_rounds as f64 / healthy_accounts.max(1) as f64;
        if ratio <= 1.0 {
            Self::Low
        } else if ratio <= 3.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerStats {
    pub healthy_accounts: usize,
    pub total_accounts: usize,
    pub active_rounds: usize,
    pub completed_rounds: u64,
    pub failed_rounds: u64,
    pub average_processing_ms: f64,
    pub success_rate: f64,
    pub load: LoadLevel,
}

/// Running totals of finished rounds.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CompletionTotals {
    pub completed: u64,
    pub failed: u64,
    pub processing_ms: u64,
}

impl CompletionTotals {
    pub fn record(&mut self, success: bool, processing_ms: u64) {
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.processing_ms = self.processing_ms.saturating_add(processing_ms);
    }

    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn average_processing_ms(&self) -> f64 {
        match self.finished() {
            0 => 0.0,
            n => self.processing_ms as f64 / n as f64,
        }
    }

    /// 1.0 before anything finished.
    pub fn success_rate(&self) -> f64 {
        match self.finished() {
            0 => 1.0,
            n => self.completed as f64 / n as f64,
        }
    }
}
