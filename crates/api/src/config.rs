//! Application configuration
//!
//! Loaded from an optional TOML file layered under `WINDWATCH__*`
//! environment variables. Every field has a default.

use crate::live::LiveConfig;
use crate::rate_limit::RateLimitConfig;
use config::{Config, ConfigError, Environment, File};
use fmi_client::FmiConfig;
use poll_scheduler::{SchedulerConfig, StateFiles};
use serde::{Deserialize, Serialize};
use station_registry::Station;
use std::path::PathBuf;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "WINDWATCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "windwatch.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Persisted state locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: PathBuf,
    pub readings_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("data/poll_state.json"),
            readings_file: PathBuf::from("data/latest_readings.json"),
        }
    }
}

impl StorageConfig {
    pub fn state_files(&self) -> StateFiles {
        StateFiles {
            poll_states: self.state_file.clone(),
            readings: self.readings_file.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub fmi: FmiConfig,
    pub storage: StorageConfig,
    pub live: LiveConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    /// Replaces the built-in station list when set
    pub stations: Option<Vec<Station>>,
}

impl AppConfig {
    /// Load from the file named by `WINDWATCH_CONFIG` (default `windwatch.toml`)
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from `path` if it exists, then apply environment overrides
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("WINDWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
