//! Retry delay schedule for one orchestrator run.

use rand::Rng;
use std::time::Duration;
use vrfguard_types::RetryConfig;

/// Exponential schedule with ±jitter, made non-decreasing and capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay_ms: u64,
    max_delay: Duration,
    jitter_factor: f64,
    last: Duration,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_factor: RetryConfig::JITTER_FACTOR,
            last: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (1-based), scaling the
    /// classification's suggested wait by `2^(attempt-1)`.
    pub fn next_delay(&mut self, wait_time_ms: u64, attempt: u32) -> Duration {
        let base = wait_time_ms.max(self.base_delay_ms);
        let scaled = base.saturating_mul(1_u64 << attempt.saturating_sub(1).min(20));
        let jittered = Duration::from_millis(apply_jitter(scaled, self.jitter_factor));
        let delay = jittered.max(self.last).min(self.max_delay);
        self.last = delay;
        delay
    }
}

/// `ms × (1 ± factor)`, uniformly.
pub fn apply_jitter(ms: u64, factor: f64) -> u64 {
    if ms == 0 || factor <= 0.0 {
        return ms;
    }
    let spread = rand::thread_rng().gen_range(-factor..=factor);
    ((ms as f64) * (1.0 + spread)).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_band() {
        for _ in 0..200 {
            let ms = apply_jitter(1000, 0.2);
            assert!((800..=1200).contains(&ms), "{ms}");
        }
        assert_eq!(apply_jitter(1000, 0.0), 1000);
    }

    #[test]
    fn test_schedule_is_monotone_and_capped() {
        let config = RetryConfig { max_delay_ms: 9000, ..RetryConfig::default() };
        for _ in 0..50 {
            let mut backoff = Backoff::new(&config);
            let mut previous = Duration::ZERO;
            // a large suggested wait followed by smaller ones must not shrink the delay
            for (attempt, wait) in [(1, 5000), (2, 1000), (3, 2000), (4, 1000), (5, 30_000)] {
                let delay = backoff.next_delay(wait, attempt);
                assert!(delay >= previous);
                assert!(delay <= Duration::from_millis(9000));
                previous = delay;
            }
            assert_eq!(previous, Duration::from_millis(9000));
        }
    }

    #[test]
    fn test_without_jitter_is_exact() {
        let mut backoff = Backoff::new(&RetryConfig::default()).with_jitter(0.0);
        assert_eq!(backoff.next_delay(2000, 1), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(2000, 2), Duration::from_millis(4000));
        assert_eq!(backoff.next_delay(500, 3), Duration::from_millis(4000));
        assert_eq!(backoff.next_delay(10_000, 4), Duration::from_millis(30_000));
    }
}
