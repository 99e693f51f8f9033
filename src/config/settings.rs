//! Configuration settings for campus-market.
//!
//! Settings are loaded from `~/.campus-market/config.yaml`. Backend
//! credentials may also come from the environment so they never have to be
//! written to disk.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::MarketError;

/// Environment variable overriding `backend.url`.
pub const BACKEND_URL_ENV: &str = "CAMPUS_MARKET_BACKEND_URL";
/// Environment variable overriding `backend.api_key`.
pub const API_KEY_ENV: &str = "CAMPUS_MARKET_API_KEY";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Remote backend settings.
    pub backend: BackendConfig,
    /// Offline queue settings.
    pub sync: SyncConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
}

/// Hosted backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend project, e.g. `https://xyz.example.co`.
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Public API key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Path probed to decide whether the backend is reachable.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

/// Offline queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Key the queue blob is stored under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Seconds between periodic drain passes while online.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    /// Upper bound for a single backend dispatch.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// Seconds between connectivity probes in `sync watch`.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl SyncConfig {
    #[must_use]
    pub const fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_health_path() -> String {
    "/rest/v1/".to_string()
}

fn default_storage_key() -> String {
    "campus-market.offline-queue".to_string()
}

const fn default_drain_interval_secs() -> u64 {
    60
}

const fn default_dispatch_timeout_secs() -> u64 {
    15
}

const fn default_probe_interval_secs() -> u64 {
    15
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
            health_path: default_health_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            drain_interval_secs: default_drain_interval_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, then apply environment
    /// overrides.
    ///
    /// Returns default configuration if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, MarketError> {
        let paths = Paths::new()?;
        let mut config = Self::load_from_path(&paths.config_file)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, MarketError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            MarketError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            MarketError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sync loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Config` naming the first zero interval or
    /// timeout.
    pub fn validate(&self) -> Result<(), MarketError> {
        let sync = &self.sync;
        for (name, value) in [
            ("sync.drain_interval_secs", sync.drain_interval_secs),
            ("sync.dispatch_timeout_secs", sync.dispatch_timeout_secs),
            ("sync.probe_interval_secs", sync.probe_interval_secs),
            ("backend.request_timeout_ms", self.backend.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(MarketError::Config(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    /// Save configuration to a specific path.
    #[cfg(test)]
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), MarketError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| MarketError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            MarketError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Override backend settings from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(BACKEND_URL_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, url: Option<String>, api_key: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.backend.url = url.trim().to_string();
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.backend.api_key = Some(key.trim().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.default_output, OutputFormat::Pretty);
        assert_eq!(config.backend.url, "http://localhost:54321");
        assert!(config.backend.api_key.is_none());
        assert_eq!(config.sync.storage_key, "campus-market.offline-queue");
        assert_eq!(config.sync.drain_interval(), Duration::from_secs(60));
        assert_eq!(config.sync.dispatch_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.sync.drain_interval_secs, 60);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.backend.url = "https://campus.example.co".to_string();
        config.sync.drain_interval_secs = 30;

        config.save_to_path(&config_path).unwrap();
        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.backend.url, "https://campus.example.co");
        assert_eq!(loaded.sync.drain_interval_secs, 30);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
sync:
  dispatch_timeout_secs: 5
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.sync.dispatch_timeout_secs, 5);
        assert_eq!(config.sync.drain_interval_secs, 60);
        assert_eq!(config.backend.health_path, "/rest/v1/");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync: [not, a, map").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        for yaml in [
            "sync:\n  drain_interval_secs: 0\n",
            "sync:\n  probe_interval_secs: 0\n",
            "sync:\n  dispatch_timeout_secs: 0\n",
        ] {
            std::fs::write(&config_path, yaml).unwrap();
            let err = Config::load_from_path(&config_path).unwrap_err();
            assert!(
                matches!(&err, MarketError::Config(msg) if msg.contains("must be greater than 0")),
                "{yaml}: {err}"
            );
        }
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let mut config = Config::default();
        config.apply_overrides(Some("  ".to_string()), Some("anon-key".to_string()));

        assert_eq!(config.backend.url, "http://localhost:54321");
        assert_eq!(config.backend.api_key.as_deref(), Some("anon-key"));

        config.apply_overrides(Some("https://other.example.co".to_string()), None);
        assert_eq!(config.backend.url, "https://other.example.co");
    }
}
