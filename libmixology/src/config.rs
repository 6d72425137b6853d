//! Configuration management for Mixology

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub favorites: FavoritesConfig,
    #[serde(default)]
    pub bartender: BartenderConfig,
}

/// Tuning knobs shared by every state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between the last keystroke and the search request
    pub search_debounce_ms: u64,
    /// Number of drinks loaded by the discovery screen
    pub random_batch_size: usize,
    /// Per-subscriber buffer of the side-effect broadcast channel
    pub side_effect_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BartenderConfig {
    pub min_prompt_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: 500,
            random_batch_size: 10,
            side_effect_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/mixology/favorites.db".to_string(),
        }
    }
}

impl Default for BartenderConfig {
    fn default() -> Self {
        Self { min_prompt_chars: 3 }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: defaults are returned instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MIXOLOGY_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("mixology").join("config.toml"))
}

/// Expand `~` in the favorites database path
pub fn resolve_favorites_path(config: &FavoritesConfig) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&config.path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default_config();
        assert_eq!(config.engine.search_debounce_ms, 500);
        assert_eq!(config.engine.random_batch_size, 10);
        assert_eq!(config.bartender.min_prompt_chars, 3);
        assert_eq!(config.engine.search_debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nsearch_debounce_ms = 250").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.engine.search_debounce_ms, 250);
        assert_eq!(config.engine.random_batch_size, 10);
        assert_eq!(config.favorites, FavoritesConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[engine\nsearch_debounce_ms = ").unwrap();

        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        std::env::set_var("MIXOLOGY_CONFIG", "/tmp/mixology-test.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("MIXOLOGY_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/mixology-test.toml"));
    }

    #[test]
    #[serial]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        std::env::set_var("MIXOLOGY_CONFIG", missing.to_str().unwrap());
        let config = Config::load().unwrap();
        std::env::remove_var("MIXOLOGY_CONFIG");

        assert_eq!(config, Config::default_config());
    }
}
