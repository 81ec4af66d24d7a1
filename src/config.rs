//! # Monitor Configuration
//!
//! Serial link, log destinations, and host time source for a monitoring
//! session. Every field has a default, so an empty file is a valid config.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud = 115200
//!
//! [logs]
//! delta_path = "delta_t.txt"
//! drift_path = "drift_corrections.txt"
//!
//! [time_source]
//! kind = "command"
//! command = ["date", "+%s.%N"]
//! ```
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use drift_monitor::config::{Config, TimeSourceKind};
//! let toml_str = r#"
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [time_source]
//! kind = "command"
//! "#;
//! let config: Config = toml::from_str(toml_str).unwrap();
//! assert_eq!(config.serial.port, "/dev/ttyUSB0");
//! assert_eq!(config.serial.baud, 115200);
//! assert_eq!(config.time_source.kind, TimeSourceKind::Command);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::time_source::{CommandTimeSource, SystemTimeSource, TimeSource, TimeSourceError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the serial link, log streams, and time source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub logs: LogConfig,
    #[serde(default)]
    pub time_source: TimeSourceConfig,
}

/// Device serial link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
        }
    }
}

/// Append-only log destinations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_delta_path")]
    pub delta_path: PathBuf,
    #[serde(default = "default_drift_path")]
    pub drift_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            delta_path: default_delta_path(),
            drift_path: default_drift_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    #[default]
    System,
    Command,
}

/// Host time source. `command` is only used when `kind = "command"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeSourceConfig {
    #[serde(default)]
    pub kind: TimeSourceKind,
    #[serde(default = "default_time_command")]
    pub command: Vec<String>,
}

impl Default for TimeSourceConfig {
    fn default() -> Self {
        Self {
            kind: TimeSourceKind::default(),
            command: default_time_command(),
        }
    }
}

impl TimeSourceConfig {
    pub fn build(&self) -> Result<Box<dyn TimeSource>, TimeSourceError> {
        match self.kind {
            TimeSourceKind::System => Ok(Box::new(SystemTimeSource)),
            TimeSourceKind::Command => Ok(Box::new(CommandTimeSource::new(&self.command)?)),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial baud must be > 0".to_string()));
        }
        if self.logs.delta_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("logs.delta_path must not be empty".to_string()));
        }
        if self.logs.drift_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("logs.drift_path must not be empty".to_string()));
        }
        if self.time_source.kind == TimeSourceKind::Command && self.time_source.command.is_empty() {
            return Err(ConfigError::Invalid(
                "time_source.command must name a program".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_delta_path() -> PathBuf { PathBuf::from("delta_t.txt") }
fn default_drift_path() -> PathBuf { PathBuf::from("drift_corrections.txt") }
fn default_time_command() -> Vec<String> { vec!["date".to_string(), "+%s.%N".to_string()] }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}
