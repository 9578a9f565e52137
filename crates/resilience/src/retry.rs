// crates/resilience/src/retry.rs
//! Retry budgets and backoff delays
//!
//! A policy does not run anything itself. Callers record attempts somewhere
//! durable and ask the policy whether another attempt is allowed and how long
//! to wait before making it.

use std::time::Duration;

/// Linear, capped backoff with an attempt budget
///
/// The wait after `n` failed attempts is `min(base_delay * n, max_delay)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts allowed before the operation counts as failed
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// How long to wait after `attempts` failed attempts
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        self.base_delay
            .checked_mul(attempts)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true once no further attempts are allowed
    ///
    /// A budget of zero still allows the first attempt; it only forbids retries.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
