//! Configuration file handling.
//!
//! The config is a single JSON document. A missing file means defaults;
//! writes go through a temp file and a rename.

use std::fs;
use std::path::{Path, PathBuf};

use vrfguard_types::{ConfigError, ResilienceConfig};

/// Environment variable naming the default config path.
pub const CONFIG_ENV: &str = "VRFGUARD_CONFIG";

const CONFIG_FILE: &str = "vrfguard.json";

/// `$VRFGUARD_CONFIG`, falling back to `./vrfguard.json`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from)
}

fn io_error(path: &Path, e: &std::io::Error) -> ConfigError {
    ConfigError::Io { path: path.display().to_string(), message: e.to_string() }
}

/// Load and validate the config at `path`.
///
/// A config whose emergency window does not outlast the worst-case retry
/// budget still loads; it is only logged. `vrfguard config validate` is the
/// strict check.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(ResilienceConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| io_error(path, &e))?;
    let config: ResilienceConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse { message: e.to_string() })?;
    config.validate_fields()?;

    if let Err(e) = config.check_budget() {
        tracing::warn!(path = %path.display(), "{}", e);
    }

    Ok(config)
}

/// Save the config atomically.
pub fn save_config(path: &Path, config: &ResilienceConfig) -> Result<(), ConfigError> {
    config.validate_fields()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Parse { message: e.to_string() })?;

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content).map_err(|e| io_error(&temp_path, &e))?;
    fs::rename(&temp_path, path).map_err(|e| io_error(path, &e))
}

/// Load, mutate and save in one step.
pub fn update_config<F>(path: &Path, updater: F) -> Result<ResilienceConfig, ConfigError>
where
    F: FnOnce(&mut ResilienceConfig),
{
    let mut config = load_config(path)?;
    updater(&mut config);
    save_config(path, &config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrfguard_types::OracleAccountConfig;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ResilienceConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vrfguard.json");

        let mut config = ResilienceConfig::default();
        config.retry.max_retries = 4;
        config.accounts.push(OracleAccountConfig {
            identity: "Vrf1111".into(),
            name: "primary".into(),
            priority: 1,
        });
        save_config(&path, &config).unwrap();

        assert!(!dir.path().join("nested").join("vrfguard.json.tmp").exists());
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.retry.max_retries, 4);
        assert_eq!(loaded.accounts.len(), 1);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.json");
        fs::write(&path, r#"{"retry": {"max_retries": 0}}"#).unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_update_config_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrfguard.json");
        update_config(&path, |c| c.emergency.timeout_ms = 90_000).unwrap();
        assert_eq!(load_config(&path).unwrap().emergency.timeout_ms, 90_000);
    }
}
