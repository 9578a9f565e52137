// crates/resilience/src/error.rs
//! Error types for resilience operations

use thiserror::Error;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The guarded operation did not finish in time
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ResilienceError {
    /// Returns true if the failed operation may succeed when tried again later
    pub fn is_transient(&self) -> bool {
        match self {
            ResilienceError::Timeout(_) => true,
        }
    }
}
