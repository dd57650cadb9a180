//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

/// Retry policy applied around batch delivery.
///
/// `max_attempts` bounds the total number of attempts, including the first.
/// Delays between attempts grow exponentially from `initial_delay` up to
/// `max_delay`, with ±`jitter` randomization so concurrent consumers do not
/// retry in lockstep. Every batch delivery gets its own fresh attempt
/// counter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 100 ms).
    pub initial_delay: Duration,
    /// Cap on the computed delay (default: 10 s).
    pub max_delay: Duration,
    /// Exponential growth factor (default: 2.0).
    pub multiplier: f64,
    /// Jitter fraction in `0.0..=1.0` (default: 0.25, i.e. ±25 %).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given total attempt bound.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempts` completed ones.
    #[must_use]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay to wait before the retry following attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_jitter(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::with_max_attempts(max_attempts)
        }
    }

    #[test]
    fn attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = without_jitter(5);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = without_jitter(32);
        assert_eq!(policy.backoff(30), policy.max_delay);
    }

    #[test]
    fn jitter_stays_within_spread() {
        let policy = RetryPolicy::default();
        let base = Duration::from_millis(100).as_secs_f64();
        for _ in 0..100 {
            let delay = policy.backoff(1).as_secs_f64();
            assert!(delay >= base * 0.75 - f64::EPSILON);
            assert!(delay <= base * 1.25 + f64::EPSILON);
        }
    }
}
