//! The settings file on disk
//!
//! Saves replace the file atomically (temporary file, then rename) after
//! copying the previous version to `sync.toml.backup`. Loads degrade to
//! defaults when the stored values are out of range, so a bad file can never
//! keep the sync engine from starting.

use crate::{Config, ConfigError, ConfigResult, CONFIG_VERSION};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Reads and writes one TOML settings file
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the previous version is copied before an overwrite
    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("toml.backup")
    }

    /// Loads the file; a missing file yields the defaults
    pub fn load(&self) -> ConfigResult<Config> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No settings file at {}, using defaults", self.path.display());
                return Ok(Config::default());
            }
            Err(source) => return Err(self.io_error(&self.path, source)),
        };

        if contents.trim().is_empty() {
            return Err(ConfigError::Empty {
                path: self.path.clone(),
            });
        }

        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        if config.version > CONFIG_VERSION {
            log::warn!(
                "Settings file version {} is newer than {}, unknown keys are ignored",
                config.version,
                CONFIG_VERSION
            );
        }

        match config.validate() {
            Ok(()) => Ok(config),
            Err(errors) => {
                log::warn!(
                    "Ignoring out-of-range settings in {}: {}",
                    self.path.display(),
                    ConfigError::Invalid(errors)
                );
                Ok(Config::default())
            }
        }
    }

    /// Validates and writes `config`, keeping a backup of the old file
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config.validate().map_err(ConfigError::Invalid)?;
        let contents = toml::to_string_pretty(config)?;

        let dir = self.directory();
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;
            log::info!("Created config directory {}", dir.display());
        }

        if self.path.exists() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(|source| ConfigError::Backup {
                path: backup.clone(),
                source,
            })?;
            log::debug!("Previous settings kept at {}", backup.display());
        }

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(dir, e))?;
        temp.write_all(contents.as_bytes())
            .and_then(|()| temp.flush())
            .map_err(|e| self.io_error(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| self.io_error(&self.path, e.error))?;

        log::info!("Settings saved to {}", self.path.display());
        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_file() -> (TempDir, SettingsFile) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = SettingsFile::new(temp_dir.path().join("sync.toml"));
        (temp_dir, file)
    }

    #[test]
    fn test_missing_file_is_default() {
        let (_temp_dir, file) = settings_file();
        assert_eq!(file.load().unwrap(), Config::default());
        assert!(!file.path().exists());
    }

    #[test]
    fn test_saved_values_are_loaded_back() {
        let (_temp_dir, file) = settings_file();
        let mut config = Config::default();
        config.sync.max_retries = 6;
        config.sync.enable_conflict_resolution = false;

        file.save(&config).unwrap();
        assert_eq!(file.load().unwrap(), config);
    }

    #[test]
    fn test_nested_directory_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let file = SettingsFile::new(temp_dir.path().join("a").join("b").join("sync.toml"));

        file.save(&Config::default()).unwrap();
        assert!(file.path().exists());
    }

    #[test]
    fn test_overwrite_keeps_previous_version() {
        let (_temp_dir, file) = settings_file();
        let mut config = Config::default();
        config.sync.batch_size = 5;
        file.save(&config).unwrap();

        config.sync.batch_size = 50;
        file.save(&config).unwrap();

        let backup = fs::read_to_string(file.backup_path()).unwrap();
        assert!(backup.contains("batch_size = 5"));
        assert_eq!(file.load().unwrap().sync.batch_size, 50);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let (_temp_dir, file) = settings_file();
        fs::write(file.path(), "this is not valid TOML {{{").unwrap();
        assert!(matches!(file.load(), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_blank_file_is_empty_error() {
        let (_temp_dir, file) = settings_file();
        fs::write(file.path(), "   \n").unwrap();
        assert!(matches!(file.load(), Err(ConfigError::Empty { .. })));
    }

    #[test]
    fn test_out_of_range_values_fall_back_to_defaults() {
        let (_temp_dir, file) = settings_file();
        fs::write(file.path(), "version = 1\n[sync]\nbatch_size = 0\n").unwrap();
        assert_eq!(file.load().unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_config_is_never_written() {
        let (_temp_dir, file) = settings_file();
        let mut config = Config::default();
        config.sync.batch_size = 0;

        assert!(matches!(file.save(&config), Err(ConfigError::Invalid(_))));
        assert!(!file.path().exists());
    }
}
