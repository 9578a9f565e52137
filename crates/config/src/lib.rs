//! VoteSync Configuration System
//!
//! Holds the tunables of the offline sync engine and persists the user's
//! overrides next to the record store.
//!
//! # Architecture
//!
//! - **Trait-based**: each section implements `ConfigSection` and lists its rules with `Checks`
//! - **Partial updates**: `SettingsPatch` carries only the fields a caller wants to change
//! - **Atomic writes**: config files are never left in a corrupted state
//! - **Zero panics**: all errors are handled via Result types
//!
//! # Example
//!
//! ```rust
//! use votesync_config::{SettingsPatch, SyncSettings};
//!
//! let settings = SyncSettings::default();
//! let patch = SettingsPatch {
//!     max_retries: Some(2),
//!     retry_delay_ms: Some(100),
//!     ..Default::default()
//! };
//!
//! let updated = settings.patched(&patch).expect("valid patch");
//! assert_eq!(updated.max_retries, 2);
//! ```

mod error;
mod manager;
mod persistence;
mod sync_settings;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use manager::{ConfigManager, ENV_PREFIX};
pub use sync_settings::{SettingsPatch, SyncSettings, MAX_SYNCED_RETENTION_MS};
pub use persistence::SettingsFile;
pub use validation::{Checks, ConfigSection, ValidationError};

use serde::{Deserialize, Serialize};

/// Schema version written to new files
pub const CONFIG_VERSION: u32 = 1;

/// Contents of `sync.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: u32,

    /// Offline queue and synchronization settings
    pub sync: SyncSettings,
}

impl Config {
    /// Every broken rule across all sections
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        self.sync.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sync: SyncSettings::default(),
        }
    }
}
