// crates/resilience/src/lib.rs
//! Resilience patterns for the offline sync engine
//!
//! This module provides:
//! - Per-record retry budgets with linear, capped backoff
//! - Timeout handling for remote calls
//!
//! # Example
//!
//! ```rust
//! use votesync_resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3)
//!     .with_base_delay(Duration::from_millis(100));
//!
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
//! assert!(policy.is_exhausted(3));
//! ```

mod error;
mod retry;
mod timeout;

pub use error::{ResilienceError, ResilienceResult};
pub use retry::RetryPolicy;
pub use timeout::with_timeout;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_exports_accessible() {
        let _: RetryPolicy = RetryPolicy::default();
        let _: ResilienceResult<()> = Err(ResilienceError::Timeout(std::time::Duration::from_secs(5)));
    }
}
