//! Owner of the on-disk settings
//!
//! The sync engine keeps one `sync.toml` per user. `ConfigManager` resolves
//! where it lives and is the only code that writes it.

use crate::persistence::SettingsFile;
use crate::{Config, ConfigError, ConfigResult, SettingsPatch, SyncSettings};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = "sync.toml";

/// Prefix of the environment variables read by [`ConfigManager::load_with_env_overrides`]
pub const ENV_PREFIX: &str = "VOTESYNC_SYNC_";

pub struct ConfigManager {
    file: SettingsFile,
}

impl ConfigManager {
    /// Uses the per-user config directory of the platform
    /// (`~/.config/votesync/` on Linux)
    pub fn new() -> ConfigResult<Self> {
        let dirs = ProjectDirs::from("", "", "votesync").ok_or(ConfigError::NoConfigDir)?;
        Self::in_directory(dirs.config_dir().to_path_buf())
    }

    /// Keeps `sync.toml` under `dir`, which is created on the first save
    pub fn in_directory(dir: PathBuf) -> ConfigResult<Self> {
        if dir.is_file() {
            return Err(ConfigError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "config directory path is a file",
                ),
                path: dir,
            });
        }
        Ok(Self {
            file: SettingsFile::new(dir.join(FILE_NAME)),
        })
    }

    pub fn config_path(&self) -> &Path {
        self.file.path()
    }

    pub fn load(&self) -> ConfigResult<Config> {
        self.file.load()
    }

    /// Like [`load`](Self::load), but a broken file yields the defaults
    pub fn load_or_default(&self) -> Config {
        self.load().unwrap_or_else(|e| {
            log::warn!("{}; continuing with default settings", e);
            Config::default()
        })
    }

    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.file.save(config)
    }

    /// Replaces the `[sync]` table
    pub fn save_settings(&self, settings: &SyncSettings) -> ConfigResult<()> {
        self.update(|config| config.sync = settings.clone())
    }

    /// Read-modify-write of the whole file
    ///
    /// ```rust,no_run
    /// # fn main() -> votesync_config::ConfigResult<()> {
    /// let manager = votesync_config::ConfigManager::new()?;
    /// manager.update(|config| config.sync.batch_size = 20)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn update(&self, edit: impl FnOnce(&mut Config)) -> ConfigResult<()> {
        let mut config = self.load_or_default();
        edit(&mut config);
        self.save(&config)
    }

    /// Writes the defaults unless a file is already there; true when written
    pub fn initialize(&self) -> ConfigResult<bool> {
        let path = self.config_path();
        if path.exists() {
            return Ok(false);
        }
        self.save(&Config::default())?;
        log::info!("Wrote default sync settings to {}", path.display());
        Ok(true)
    }

    pub fn reset(&self) -> ConfigResult<()> {
        log::info!("Resetting sync settings to defaults");
        self.save(&Config::default())
    }

    /// Loads the file, then applies `VOTESYNC_SYNC_*` variables on top
    ///
    /// `VOTESYNC_SYNC_MAX_RETRIES=5` overrides `max_retries`. A variable that
    /// does not parse is skipped. If the overrides together break a rule,
    /// none of them is applied.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        let patch = patch_from_env(|name| std::env::var(name).ok());
        if patch.is_empty() {
            return Ok(config);
        }

        match config.sync.patched(&patch) {
            Ok(settings) => {
                log::debug!("Applied environment overrides: {:?}", patch);
                config.sync = settings;
            }
            Err(e) => log::warn!("Environment overrides rejected: {}", e),
        }
        Ok(config)
    }
}

/// Builds a patch from `lookup`, which maps a full variable name to its value
fn patch_from_env(lookup: impl Fn(&str) -> Option<String>) -> SettingsPatch {
    let read = |key: &str| -> Option<String> { lookup(&format!("{}{}", ENV_PREFIX, key)) };

    fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
        let raw = raw?;
        let value = raw.trim().parse().ok();
        if value.is_none() {
            log::warn!("Skipping {}{}: cannot parse {:?}", ENV_PREFIX, key, raw);
        }
        value
    }

    macro_rules! field {
        ($key:literal) => {
            parsed($key, read($key))
        };
    }

    SettingsPatch {
        enable_auto_sync: field!("ENABLE_AUTO_SYNC"),
        sync_interval_ms: field!("INTERVAL_MS"),
        max_retries: field!("MAX_RETRIES"),
        retry_delay_ms: field!("RETRY_DELAY_MS"),
        max_retry_delay_ms: field!("MAX_RETRY_DELAY_MS"),
        batch_size: field!("BATCH_SIZE"),
        enable_conflict_resolution: field!("ENABLE_CONFLICT_RESOLUTION"),
        max_storage_size: field!("MAX_STORAGE_SIZE"),
        cleanup_interval_ms: field!("CLEANUP_INTERVAL_MS"),
        synced_retention_ms: field!("SYNCED_RETENTION_MS"),
        request_timeout_ms: field!("REQUEST_TIMEOUT_MS"),
    }
}
