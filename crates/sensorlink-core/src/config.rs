//! Monitor configuration
//!
//! Stored as pretty-printed JSON. Missing fields fall back to defaults, so a
//! config written by an older version still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datalog::{DEFAULT_LOG_FILE, DEFAULT_WINDOW_CAPACITY};
use crate::protocol::{
    LinkConfig, DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_SETTLE_DELAY_MS,
};

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// Errors loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Serial port to open when none is given on the command line
    pub port: Option<String>,

    /// Baud rate
    pub baud_rate: u32,

    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Wait after opening the port before reading, in milliseconds
    pub settle_delay_ms: u64,

    /// Reader poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Samples kept for charts
    pub window_capacity: usize,

    /// Samples buffered between reader and dispatch
    pub queue_capacity: usize,

    /// CSV log location
    pub log_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl MonitorConfig {
    /// Default config location (`<config dir>/sensorlink/config.json`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensorlink")
            .join(CONFIG_FILE)
    }

    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration, falling back to defaults if the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{e}; using defaults");
                Self::default()
            }
        }
    }

    /// Save configuration as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serial link settings
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.window_capacity, 50);
        assert_eq!(config.link_config().settle_delay, Duration::from_secs(2));
        assert_eq!(config.link_config().poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "port": "/dev/ttyUSB0", "window_capacity": 120 }"#).unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.window_capacity, 120);
        assert_eq!(config.settle_delay_ms, DEFAULT_SETTLE_DELAY_MS);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = MonitorConfig {
            port: Some("COM3".into()),
            settle_delay_ms: 0,
            ..MonitorConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(MonitorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            MonitorConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert_eq!(MonitorConfig::load_or_default(&path), MonitorConfig::default());
    }
}
