// crates/sync-engine/src/error.rs
//! Error types for the record store and sync operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type for record store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by a [`RecordStore`](crate::RecordStore)
///
/// A failed mutation never leaves a partial change behind.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing file exists but does not hold a record collection
    #[error("Record store at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// Storing the record would exceed the configured ceiling
    #[error("Storage quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// A record with this id already exists and overwrite was not requested
    #[error("Record already exists: {0}")]
    DuplicateId(String),

    /// A previous writer panicked while holding the store lock
    #[error("Record store lock poisoned")]
    LockPoisoned,
}

/// Errors that can occur during synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// The record store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Settings were rejected; the previous settings stay in effect
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller passed something unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No record with this id
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A blocking store task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<votesync_config::ConfigError> for SyncError {
    fn from(err: votesync_config::ConfigError) -> Self {
        SyncError::Configuration(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}
