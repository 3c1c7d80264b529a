//! Temporary exclusion of accounts from selection.
//!
//! Entries carry their own deadline and a scheduled removal. Reads also
//! check the deadline, so an entry is never honoured past expiry even when
//! no runtime is available to run the removal.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::resilience::scheduler::ScheduledTask;

pub const DEFAULT_QUARANTINE: Duration = Duration::from_secs(300);
const MIN_QUARANTINE: Duration = Duration::from_secs(60);
const QUARANTINE_WAIT_MULTIPLIER: u64 = 10;

/// `clamp(wait × 10, 60s, 5min)`, or 5 minutes when no wait was suggested.
pub fn quarantine_duration(wait_time_ms: u64) -> Duration {
    if wait_time_ms == 0 {
        return DEFAULT_QUARANTINE;
    }
    Duration::from_millis(wait_time_ms.saturating_mul(QUARANTINE_WAIT_MULTIPLIER))
        .clamp(MIN_QUARANTINE, DEFAULT_QUARANTINE)
}

struct QuarantineEntry {
    id: u64,
    until: Instant,
    reason: String,
    expiry: Option<ScheduledTask>,
}

#[derive(Default)]
pub struct QuarantineSet {
    entries: Arc<DashMap<String, QuarantineEntry>>,
    next_id: AtomicU64,
}

impl QuarantineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quarantine `name` for `duration`, replacing any existing entry.
    pub fn insert(&self, name: &str, duration: Duration, reason: impl Into<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entries = Arc::clone(&self.entries);
        let key = name.to_string();

        let expiry = ScheduledTask::try_after(duration, async move {
            if let Some((name, entry)) = entries.remove_if(&key, |_, e| e.id == id) {
                if let Some(task) = entry.expiry {
                    task.detach();
                }
                tracing::info!(account = %name, "quarantine expired");
            }
        });

        self.entries.insert(
            name.to_string(),
            QuarantineEntry { id, until: Instant::now() + duration, reason: reason.into(), expiry },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.remaining(name).is_some()
    }

    /// Time left in quarantine, `None` if not quarantined.
    pub fn remaining(&self, name: &str) -> Option<Duration> {
        let now = Instant::now();
        let until = self.entries.get(name)?.until;
        if until > now {
            return Some(until - now);
        }
        self.entries.remove_if(name, |_, e| e.until <= now);
        None
    }

    pub fn reason(&self, name: &str) -> Option<String> {
        self.remaining(name)?;
        self.entries.get(name).map(|e| e.reason.clone())
    }

    /// Lift a quarantine early. Returns whether one was active.
    pub fn release(&self, name: &str) -> bool {
        let active = self.contains(name);
        self.entries.remove(name);
        active
    }

    pub fn names(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.until > now).map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
