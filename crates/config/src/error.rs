//! Error types for loading, validating and saving settings

use crate::validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading, writing or creating something under the config directory failed
    #[error("Config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file exists but holds nothing
    #[error("Config file at {path} is empty")]
    Empty { path: PathBuf },

    /// The settings file is not valid TOML for this schema
    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// One or more settings are out of range; nothing was applied
    #[error("Invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    /// The platform has no per-user config directory
    #[error("Could not determine the user config directory")]
    NoConfigDir,

    /// Copying the previous file aside before an overwrite failed
    #[error("Failed to back up config file to {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Field-level errors of a validation failure; empty for anything else
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lists_every_field() {
        let err = ConfigError::Invalid(vec![
            ValidationError::new("sync.batch_size", "must be at least 1"),
            ValidationError::with_value("sync.sync_interval_ms", "must be between 10 and 86400000", 5),
        ]);

        assert_eq!(
            err.to_string(),
            "Invalid configuration: sync.batch_size must be at least 1; \
             sync.sync_interval_ms must be between 10 and 86400000 (got 5)"
        );
        assert_eq!(err.validation_errors().len(), 2);
    }

    #[test]
    fn test_other_errors_have_no_field_errors() {
        let err = ConfigError::Empty {
            path: PathBuf::from("/tmp/sync.toml"),
        };
        assert!(err.validation_errors().is_empty());
        assert!(err.to_string().contains("/tmp/sync.toml"));
    }
}
