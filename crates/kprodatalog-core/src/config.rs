//! Session configuration
//!
//! Stored as JSON. Every field is optional in the file; missing values take
//! the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::message::MessageType;
use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Errors loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatalogConfig {
    pub capture: CaptureConfig,
    pub replay: ReplayConfig,
    pub serial: SerialConfig,
}

impl DatalogConfig {
    /// Load a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate JSON config text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: DatalogConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        for (name, interval) in [
            ("status_interval_ms", capture.status_interval_ms),
            ("datalog1_interval_ms", capture.datalog1_interval_ms),
            ("datalog2_interval_ms", capture.datalog2_interval_ms),
            ("datalog3_interval_ms", capture.datalog3_interval_ms),
        ] {
            if interval == 0 {
                return Err(ConfigError::Invalid(format!("{} must be nonzero", name)));
            }
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be nonzero".into()));
        }
        Ok(())
    }
}

/// Capture loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Status poll interval
    pub status_interval_ms: u64,
    /// Datalog1 poll interval
    pub datalog1_interval_ms: u64,
    /// Datalog2 poll interval
    pub datalog2_interval_ms: u64,
    /// Datalog3 poll interval
    pub datalog3_interval_ms: u64,
    /// Time allowed for a full response to arrive
    pub read_timeout_ms: u64,
    /// Delay before re-polling a message type after a transport failure
    pub reset_backoff_ms: u64,
    /// Session length
    pub max_duration_ms: u64,
}

impl CaptureConfig {
    /// Poll interval for a message type
    pub fn interval(&self, message_type: MessageType) -> Duration {
        let ms = match message_type {
            MessageType::Status => self.status_interval_ms,
            MessageType::Datalog1 => self.datalog1_interval_ms,
            MessageType::Datalog2 => self.datalog2_interval_ms,
            MessageType::Datalog3 => self.datalog3_interval_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reset_backoff(&self) -> Duration {
        Duration::from_millis(self.reset_backoff_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 500,
            datalog1_interval_ms: 100,
            datalog2_interval_ms: 1000,
            datalog3_interval_ms: 5000,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            reset_backoff_ms: 5000,
            max_duration_ms: 60_000,
        }
    }
}

/// Replay timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// How long to wait for a poll request before moving on
    pub request_timeout_ms: u64,
    /// Hold the playback clock until the first datalog request arrives
    pub start_on_request: bool,
}

impl ReplayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            start_on_request: true,
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port name; autodetected by USB id when absent
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatalogConfig::default();
        assert_eq!(config.capture.interval(MessageType::Status), Duration::from_millis(500));
        assert_eq!(config.capture.interval(MessageType::Datalog1), Duration::from_millis(100));
        assert_eq!(config.capture.interval(MessageType::Datalog2), Duration::from_secs(1));
        assert_eq!(config.capture.interval(MessageType::Datalog3), Duration::from_secs(5));
        assert_eq!(config.capture.reset_backoff(), Duration::from_secs(5));
        assert_eq!(config.capture.max_duration(), Duration::from_secs(60));
        assert_eq!(config.serial.baud_rate, 9600);
        assert!(config.serial.port.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config = DatalogConfig::from_json(
            r#"{ "capture": { "max_duration_ms": 2500 }, "serial": { "port": "/dev/ttyUSB0" } }"#,
        )
        .unwrap();
        assert_eq!(config.capture.max_duration_ms, 2500);
        assert_eq!(config.capture.datalog1_interval_ms, 100);
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.replay, ReplayConfig::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = DatalogConfig::from_json(r#"{ "capture": { "datalog1_interval_ms": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kprodatalog.json");
        fs::write(&path, r#"{ "replay": { "start_on_request": false } }"#).unwrap();

        let config = DatalogConfig::from_file(&path).unwrap();
        assert!(!config.replay.start_on_request);
        assert!(matches!(
            DatalogConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
