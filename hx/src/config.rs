//! Helix client configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-local config file name
const LOCAL_CONFIG: &str = ".helix.yml";

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server endpoints
    pub server: ServerConfig,

    /// Per-session settings
    pub session: SessionConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Never fails: any problem here resurfaces in [`Config::load`].
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::default_paths(),
        };
        paths
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("helix").join("helix.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Helix server endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the streaming chat endpoint
    #[serde(rename = "chat-path")]
    pub chat_path: String,

    /// Path of the reset endpoint
    #[serde(rename = "reset-path")]
    pub reset_path: String,

    /// TCP connect timeout in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            chat_path: "/chat".to_string(),
            reset_path: "/reset".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    pub fn reset_url(&self) -> String {
        join_url(&self.base_url, &self.reset_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Per-session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identity sent with every request
    #[serde(rename = "user-id")]
    pub user_id: String,

    /// Give up when no fragment arrives for this long (milliseconds)
    #[serde(rename = "idle-timeout-ms")]
    pub idle_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: uuid::Uuid::now_v7().to_string(),
            idle_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}
