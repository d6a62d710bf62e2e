//! Exponential-backoff retry scheduling.
//!
//! [`RetryPolicy`] is a pure description of the backoff schedule and attempt
//! ceiling. Delay computation never sleeps, so the schedule can be verified
//! deterministically without a clock or network.

use std::time::Duration;

/// Default number of submission attempts per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Factor by which the delay grows with each attempt.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Maximum number of submission attempts per job.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given 0-indexed attempt fails.
    ///
    /// Computed as `base * multiplier^attempt`, clamped to
    /// [`max_delay`](Self::max_delay). The same schedule paces successive
    /// status polls within one attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let next_ms = (self.base.as_millis() as f64 * factor) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    /// Whether a job that just failed its `attempt`-th submission (0-indexed)
    /// may be submitted again.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn delay_clamps_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let policy = RetryPolicy::default();
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for (attempt, &expected_secs) in expected.iter().enumerate() {
            assert_eq!(
                policy.delay_for(attempt as u32),
                Duration::from_secs(expected_secs),
            );
        }
    }

    #[test]
    fn custom_multiplier() {
        let policy = RetryPolicy {
            base: Duration::from_secs(2),
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(6));
        assert_eq!(policy.delay_for(2), Duration::from_secs(18));
    }

    #[test]
    fn allows_retry_below_ceiling() {
        let policy = RetryPolicy::default();
        // max_attempts = 3: attempts 0 and 1 may retry, attempt 2 may not.
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(!policy.allows_retry(10));
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        assert!(!policy.allows_retry(0));
    }
}
