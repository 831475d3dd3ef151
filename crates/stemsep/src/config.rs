//! Global configuration for stemsep
//!
//! Configuration is stored as YAML in the user config directory.
//! Default location: ~/.config/stemsep/config.yaml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::separation::SeparationConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model selection, device and download settings
    pub separation: SeparationConfig,
}

/// Get the default config file path
///
/// Returns: `<config dir>/stemsep/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemsep")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> Config {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return Config::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}, using defaults", e);
            return Config::default();
        }
    };

    match serde_yaml::from_str::<Config>(&contents) {
        Ok(mut config) => {
            config.separation.validate();
            log::info!("load_config: Successfully loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: Failed to parse config: {}, using defaults", e);
            Config::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::ModelType;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.separation.use_gpu = false;
        config.separation.model_path = Some(PathBuf::from("/models/htdemucs.onnx"));

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "separation:\n  auto_download: false\n").unwrap();

        let config = load_config(&path);

        assert!(!config.separation.auto_download);
        assert!(config.separation.use_gpu);
        assert_eq!(config.separation.model, ModelType::HtDemucs);
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "separation: [not, a, map").unwrap();

        assert_eq!(load_config(&path), Config::default());
    }

    #[test]
    fn test_default_path_ends_with_config_yaml() {
        assert!(default_config_path().ends_with("stemsep/config.yaml"));
    }
}
