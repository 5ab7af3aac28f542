//! Configuration loading for Bindscope.
//! Reads bindscope.toml from the given path, the path in BINDSCOPE_CONFIG, or
//! the current directory. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_ENV: &str = "BINDSCOPE_CONFIG";
pub const INFERENCE_URL_ENV: &str = "BINDSCOPE_INFERENCE_URL";
pub const DB_PATH_ENV: &str = "BINDSCOPE_DB_PATH";
const DEFAULT_CONFIG_FILE: &str = "bindscope.toml";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Flat JSON history imported into an empty store on startup.
    #[serde(default = "default_legacy_history")]
    pub legacy_history: Option<PathBuf>,
}

fn default_store_path()     -> PathBuf { PathBuf::from("./data/bindscope.sqlite") }
fn default_legacy_history() -> Option<PathBuf> { Some(PathBuf::from("./data/prediction_history.json")) }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            legacy_history: default_legacy_history(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request deadline; 0 disables it.
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: 0,
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize { 5 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self { chunk_size: default_chunk_size() }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// `path` wins over BINDSCOPE_CONFIG, which wins over ./bindscope.toml.
    /// Environment overrides are applied after the file, then the result is
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse `path`, or return defaults when it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply BINDSCOPE_INFERENCE_URL / BINDSCOPE_DB_PATH from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(INFERENCE_URL_ENV) {
            self.inference.base_url = url;
        }
        if let Some(path) = lookup(DB_PATH_ENV) {
            self.store.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.chunk_size == 0 {
            return Err(ConfigError::Invalid("batch.chunk_size must be at least 1".to_string()));
        }
        if self.inference.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("inference.base_url is empty".to_string()));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.batch.chunk_size, 5);
        assert_eq!(config.inference.timeout(), None);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindscope.toml");
        std::fs::write(
            &path,
            "[inference]\nbase_url = \"http://gpu-box:9000\"\ntimeout_secs = 30\n\n[batch]\nchunk_size = 8\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.inference.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.batch.chunk_size, 8);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            INFERENCE_URL_ENV => Some("http://override:1234".to_string()),
            DB_PATH_ENV => Some("/tmp/other.sqlite".to_string()),
            _ => None,
        });
        assert_eq!(config.inference.base_url, "http://override:1234");
        assert_eq!(config.store.path, PathBuf::from("/tmp/other.sqlite"));
    }

    #[test]
    fn test_zero_chunk_size_is_invalid() {
        let mut config = Config::default();
        config.batch.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.inference.base_url = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindscope.toml");
        std::fs::write(&path, "[batch\nchunk_size = ").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
