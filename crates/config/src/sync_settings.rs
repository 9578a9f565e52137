//! Offline synchronization settings section

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{Checks, ConfigSection, ValidationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Tunables for the offline queue and the sync orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Sync automatically on reconnect and on the periodic timer
    pub enable_auto_sync: bool,

    /// Periodic auto-sync interval in milliseconds
    pub sync_interval_ms: u64,

    /// Attempts allowed per record before it is reported as failed
    pub max_retries: u32,

    /// Backoff unit in milliseconds; the wait after `n` failures is `n * retry_delay_ms`
    pub retry_delay_ms: u64,

    /// Upper bound for a single backoff wait in milliseconds
    pub max_retry_delay_ms: u64,

    /// Records processed per batch within a sync pass
    pub batch_size: usize,

    /// Treat permanent rejections as resolved in favor of the server
    pub enable_conflict_resolution: bool,

    /// Storage ceiling for queued records, in bytes
    pub max_storage_size: u64,

    /// Interval of the sweep that prunes old synced records, in milliseconds
    pub cleanup_interval_ms: u64,

    /// How long a synced record is kept before the sweep may prune it
    pub synced_retention_ms: u64,

    /// Timeout for a single remote push
    pub request_timeout_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enable_auto_sync: true,
            sync_interval_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 300_000,
            batch_size: 10,
            enable_conflict_resolution: true,
            max_storage_size: 50 * MIB,
            cleanup_interval_ms: 3_600_000,
            synced_retention_ms: 86_400_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl SyncSettings {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn synced_retention(&self) -> Duration {
        Duration::from_millis(self.synced_retention_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns a copy with `patch` applied, or every reason it is invalid
    ///
    /// `self` is never modified, so a rejected patch leaves the current
    /// settings in effect.
    pub fn patched(&self, patch: &SettingsPatch) -> ConfigResult<Self> {
        let mut next = self.clone();
        patch.apply_to(&mut next);
        next.validate().map_err(ConfigError::Invalid)?;
        Ok(next)
    }

    /// Returns true if a timer-driving interval differs from `other`
    pub fn timers_differ(&self, other: &SyncSettings) -> bool {
        self.sync_interval_ms != other.sync_interval_ms
            || self.cleanup_interval_ms != other.cleanup_interval_ms
            || self.enable_auto_sync != other.enable_auto_sync
    }
}

/// Longest time synced records may be kept: one year
pub const MAX_SYNCED_RETENTION_MS: u64 = 365 * 86_400_000;

impl ConfigSection for SyncSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Checks::new(self.section_name())
            .range("sync_interval_ms", self.sync_interval_ms, 10, 86_400_000)
            .range("max_retries", self.max_retries, 0, 100)
            .range("retry_delay_ms", self.retry_delay_ms, 0, 3_600_000)
            .ensure(
                "max_retry_delay_ms",
                self.max_retry_delay_ms >= self.retry_delay_ms,
                format!("must not be below retry_delay_ms ({})", self.retry_delay_ms),
            )
            .range("batch_size", self.batch_size, 1, 1_000)
            .at_least("max_storage_size", self.max_storage_size, 1_024)
            .range("cleanup_interval_ms", self.cleanup_interval_ms, 10, 604_800_000)
            .range("synced_retention_ms", self.synced_retention_ms, 0, MAX_SYNCED_RETENTION_MS)
            .range("request_timeout_ms", self.request_timeout_ms, 10, 300_000)
            .finish()
    }

    fn section_name(&self) -> &'static str {
        "sync"
    }
}

/// A partial update of [`SyncSettings`]; `None` fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsPatch {
    pub enable_auto_sync: Option<bool>,
    pub sync_interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub enable_conflict_resolution: Option<bool>,
    pub max_storage_size: Option<u64>,
    pub cleanup_interval_ms: Option<u64>,
    pub synced_retention_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl SettingsPatch {
    /// Returns true if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    /// Writes every present field into `settings`
    pub fn apply_to(&self, settings: &mut SyncSettings) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    settings.$field = value;
                })*
            };
        }

        take!(
            enable_auto_sync,
            sync_interval_ms,
            max_retries,
            retry_delay_ms,
            max_retry_delay_ms,
            batch_size,
            enable_conflict_resolution,
            max_storage_size,
            cleanup_interval_ms,
            synced_retention_ms,
            request_timeout_ms,
        );
    }
}
