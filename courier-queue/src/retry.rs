//! Retry and backoff policy.

use crate::job::Job;
use std::time::Duration;

/// What to do with a job whose processor just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-offer the job to its origin queue after `delay`.
    Retry {
        /// Backoff before the job becomes poppable again
        delay: Duration,
    },
    /// Retries exhausted; move to the dead letter queue.
    DeadLetter,
}

/// Smallest allowed delay ceiling: the backoff of the first retry.
pub const MIN_BACKOFF_CEILING: Duration = Duration::from_secs(2);

/// Exponential backoff rooted at 2 seconds: 2s, 4s, 8s, ...
///
/// The delay for the n-th retry is `2^n` seconds, clamped to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom delay ceiling, never below
    /// [`MIN_BACKOFF_CEILING`].
    pub fn with_max_delay(max_delay: Duration) -> Self {
        Self {
            max_delay: max_delay.max(MIN_BACKOFF_CEILING),
        }
    }

    /// Delay ceiling.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Backoff before retry number `retry_count`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let seconds = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        Duration::from_secs(seconds).min(self.max_delay)
    }

    /// Record the failure on `job` and decide its fate.
    ///
    /// Eligibility is judged on the count *before* this failure, so a job
    /// with `max_retries = 3` is retried after 2s, 4s and 8s and dead-lettered
    /// on its fourth failure.
    pub fn on_failure(&self, job: &mut Job, cause: impl Into<String>) -> RetryDecision {
        let eligible = job.can_retry();
        job.record_failure(cause);

        if eligible {
            let delay = self.backoff_delay(job.retry_count);
            job.reschedule_after(delay);
            RetryDecision::Retry { delay }
        } else {
            RetryDecision::DeadLetter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Payload;

    #[test]
    fn test_backoff_doubles_from_two_seconds() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(1024));
    }

    #[test]
    fn test_backoff_is_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(12), Duration::from_secs(3600));
        assert_eq!(policy.backoff_delay(200), Duration::from_secs(3600));

        let tight = RetryPolicy::with_max_delay(Duration::from_secs(5));
        assert_eq!(tight.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(tight.backoff_delay(3), Duration::from_secs(5));
    }

    #[test]
    fn test_ceiling_never_drops_below_first_backoff() {
        for ceiling in [Duration::ZERO, Duration::from_secs(1)] {
            let policy = RetryPolicy::with_max_delay(ceiling);
            assert_eq!(policy.max_delay(), MIN_BACKOFF_CEILING);
            assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
            assert_eq!(policy.backoff_delay(5), Duration::from_secs(2));
        }
    }

    #[test]
    fn test_three_retries_then_dead_letter() {
        let policy = RetryPolicy::default();
        let mut job = Job::new("EMAIL", Payload::new());

        let decisions: Vec<RetryDecision> = (1..=4)
            .map(|n| policy.on_failure(&mut job, format!("attempt {}", n)))
            .collect();

        assert_eq!(
            decisions,
            [
                RetryDecision::Retry {
                    delay: Duration::from_secs(2)
                },
                RetryDecision::Retry {
                    delay: Duration::from_secs(4)
                },
                RetryDecision::Retry {
                    delay: Duration::from_secs(8)
                },
                RetryDecision::DeadLetter,
            ]
        );
        assert_eq!(job.error_message.as_deref(), Some("attempt 4"));
    }

    #[test]
    fn test_zero_budget_dead_letters_immediately() {
        let policy = RetryPolicy::default();
        let mut job = Job::new("EMAIL", Payload::new()).with_max_retries(0);

        assert_eq!(policy.on_failure(&mut job, "boom"), RetryDecision::DeadLetter);
        assert_eq!(job.retry_count, 1);
    }

    #[test]
    fn test_retry_advances_schedule() {
        let policy = RetryPolicy::default();
        let mut job = Job::new("EMAIL", Payload::new());
        let created = job.scheduled_at;

        policy.on_failure(&mut job, "boom");

        assert!(job.scheduled_at >= created + chrono::Duration::seconds(2));
        assert!(!job.is_due());
    }
}
