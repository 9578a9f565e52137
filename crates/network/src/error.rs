// crates/network/src/error.rs
//! Error types for network operations

use thiserror::Error;

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors that can occur during network operations
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Transport-level HTTP failure (DNS, connect, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network unavailable
    #[error("Network is unavailable")]
    NetworkUnavailable,

    /// Timeout or other resilience guard tripped
    #[error("Resilience error: {0}")]
    Resilience(#[from] votesync_resilience::ResilienceError),
}

impl NetworkError {
    /// Returns true if the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Http(e) => match e.status() {
                Some(status) => is_retryable_status(status.as_u16()),
                None => true,
            },
            NetworkError::Status { status, .. } => is_retryable_status(*status),
            NetworkError::NetworkUnavailable => true,
            NetworkError::Resilience(e) => e.is_transient(),
            NetworkError::InvalidUrl(_) => false,
        }
    }

    /// Returns true if the error is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, NetworkError::Status { status, .. } if (400..500).contains(status))
    }

    /// Returns true if the error is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        matches!(self, NetworkError::Status { status, .. } if (500..600).contains(status))
    }
}

/// Statuses worth retrying: timeouts, throttling and every 5xx
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..600).contains(&status)
}
