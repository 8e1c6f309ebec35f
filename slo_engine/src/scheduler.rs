use rand::{rngs::StdRng, Rng, SeedableRng};
use slo_core::{Budget, SloError};
use std::time::Duration;

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(4000);

/// Tick interval for a budget: never longer than the budget window itself.
pub fn effective_interval(configured: Duration, budget: &Budget) -> Duration {
    configured.min(Duration::from_secs(budget.window_seconds()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Exclusive upper bound of the jittered delay between attempts
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_COUNT,
            max_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            max_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// `attempt` counts from 1 and is the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, err: &SloError) -> bool {
        err.is_retryable() && attempt <= self.max_retries
    }
}

/// Per-budget pacing: tick interval plus jittered retry delays.
pub struct Scheduler {
    interval: Duration,
    retry: RetryPolicy,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(interval: Duration, retry: RetryPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            interval,
            retry,
            rng,
        }
    }

    pub fn for_budget(configured: Duration, budget: &Budget, retry: RetryPolicy) -> Self {
        Self::new(effective_interval(configured, budget), retry, None)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Uniform delay in `[0, max_backoff)`, sub-millisecond resolution.
    pub fn next_backoff(&mut self) -> Duration {
        let bound = u64::try_from(self.retry.max_backoff.as_micros()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }

        Duration::from_micros(self.rng.gen_range(0..bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_capped_by_window() {
        let budget = Budget::new("1m", 60).unwrap();
        assert_eq!(
            effective_interval(Duration::from_secs(300), &budget),
            Duration::from_secs(60)
        );

        let budget = Budget::new("28d", 2_419_200).unwrap();
        assert_eq!(
            effective_interval(Duration::from_secs(300), &budget),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_retry_bound() {
        let policy = RetryPolicy::default();
        let err = SloError::Transport("timeout".to_string());

        assert_eq!(policy.max_attempts(), 4);
        assert!(policy.should_retry(1, &err));
        assert!(policy.should_retry(3, &err));
        assert!(!policy.should_retry(4, &err));
    }

    #[test]
    fn test_config_errors_not_retried() {
        let policy = RetryPolicy::default();
        let err = SloError::InvalidConfig("unknown calculation type".to_string());

        assert!(!policy.should_retry(1, &err));
    }

    #[test]
    fn test_backoff_within_bounds() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60), RetryPolicy::default(), Some(42));

        for _ in 0..1000 {
            assert!(scheduler.next_backoff() < DEFAULT_RETRY_BACKOFF);
        }
    }

    #[test]
    fn test_seeded_backoff_is_reproducible() {
        let mut a = Scheduler::new(Duration::from_secs(60), RetryPolicy::default(), Some(7));
        let mut b = Scheduler::new(Duration::from_secs(60), RetryPolicy::default(), Some(7));

        let first: Vec<Duration> = (0..5).map(|_| a.next_backoff()).collect();
        let second: Vec<Duration> = (0..5).map(|_| b.next_backoff()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_backoff() {
        let mut scheduler = Scheduler::new(
            Duration::from_secs(60),
            RetryPolicy::new(3, Duration::ZERO),
            None,
        );
        assert_eq!(scheduler.next_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_huge_backoff_saturates() {
        // exactly 2^64 microseconds
        let huge = Duration::new(18_446_744_073_709, 551_616_000);
        let mut scheduler = Scheduler::new(Duration::from_secs(60), RetryPolicy::new(3, huge), Some(1));

        let draws: Vec<Duration> = (0..10).map(|_| scheduler.next_backoff()).collect();
        assert!(draws.iter().any(|d| *d > Duration::ZERO));
        assert!(draws.iter().all(|d| *d < huge));
    }
}
