//! Edge case and error scenario tests

use std::fs;
use votesync_config::{Config, ConfigManager};
use tempfile::TempDir;

fn temp_manager() -> Result<(TempDir, ConfigManager), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let manager = ConfigManager::in_directory(temp_dir.path().to_path_buf())?;
    Ok((temp_dir, manager))
}

#[test]
fn test_corrupted_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = temp_manager()?;

    fs::write(manager.config_path(), "this is not valid TOML {{{")?;

    assert!(manager.load().is_err());
    assert_eq!(manager.load_or_default(), Config::default());

    Ok(())
}

#[test]
fn test_save_creates_parent_directories() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let nested_path = temp_dir.path().join("a").join("b").join("c");
    let manager = ConfigManager::in_directory(nested_path)?;

    manager.save(&Config::default())?;
    assert!(manager.config_path().exists());

    Ok(())
}

#[test]
fn test_partial_config_toml() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = temp_manager()?;

    let partial_toml = r#"
version = 1

[sync]
batch_size = 3
enable_auto_sync = false
"#;
    fs::write(manager.config_path(), partial_toml)?;

    let config = manager.load()?;
    assert_eq!(config.sync.batch_size, 3);
    assert!(!config.sync.enable_auto_sync);
    assert_eq!(config.sync.max_retries, 3);

    Ok(())
}

#[test]
fn test_boundary_values_validation() {
    let mut config = Config::default();

    config.sync.batch_size = 1;
    config.sync.max_retries = 0;
    assert!(config.validate().is_ok());

    config.sync.batch_size = 1_000;
    config.sync.max_retries = 100;
    assert!(config.validate().is_ok());

    config.sync.batch_size = 1_001;
    assert!(config.validate().is_err());

    config.sync.batch_size = 10;
    config.sync.max_storage_size = 1_023;
    assert!(config.validate().is_err());
}

#[test]
fn test_update_with_invalid_value_keeps_file() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = temp_manager()?;
    manager.initialize()?;

    let result = manager.update(|config| {
        config.sync.sync_interval_ms = 0;
    });
    assert!(result.is_err());

    let config = manager.load()?;
    assert_eq!(config, Config::default());

    Ok(())
}

#[test]
fn test_rapid_saves() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = temp_manager()?;
    let mut config = Config::default();

    for i in 0..50 {
        config.sync.batch_size = i % 100 + 1;
        manager.save(&config)?;
    }

    assert_eq!(manager.load()?.sync.batch_size, 50);
    Ok(())
}
