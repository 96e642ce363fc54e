//! Fixed-delay retry policy shared by the fetcher and the download stage.
//!
//! Unlike exponential backoff, every retry waits the same interval. The default
//! policy never gives up; callers escape the loop through a cancellation token.

use std::time::Duration;

use tracing::debug;

use crate::config::DEFAULT_RETRY_DELAY;

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed).
        attempt: u32,
    },

    /// Stop retrying.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Fixed-interval retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    /// `None` retries forever.
    max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Retries forever, sleeping `delay` between attempts.
    #[must_use]
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Gives up after `max_attempts` attempts (including the first).
    #[must_use]
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Returns the fixed delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the attempt cap, if any.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Decides what to do after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if let Some(max) = self.max_attempts
            && attempt >= max
        {
            debug!(attempt, max, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({max}) exhausted"),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_unbounded_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(), Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), None);
    }

    #[test]
    fn test_unbounded_policy_always_retries_with_same_delay() {
        let policy = RetryPolicy::unbounded(Duration::from_millis(250));
        for attempt in [1, 2, 10, 10_000, u32::MAX] {
            match policy.should_retry(attempt) {
                RetryDecision::Retry { delay, .. } => {
                    assert_eq!(delay, Duration::from_millis(250));
                }
                RetryDecision::DoNotRetry { reason } => panic!("gave up: {reason}"),
            }
        }
    }

    #[test]
    fn test_bounded_policy_stops_at_cap() {
        let policy = RetryPolicy::bounded(Duration::ZERO, 3);
        assert_eq!(
            policy.should_retry(2),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 3
            }
        );
        assert!(matches!(
            policy.should_retry(3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_bounded_policy_minimum_one_attempt() {
        let policy = RetryPolicy::bounded(Duration::ZERO, 0);
        assert_eq!(policy.max_attempts(), Some(1));
    }
}
