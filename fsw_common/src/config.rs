//! TOML configuration shared by every app binary.
//!
//! An app config struct embeds [`SharedConfig`] under `[shared]` and gets
//! [`ConfigLoader`] for free through the blanket impl:
//!
//! ```rust,no_run
//! use fsw_common::config::{ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct ThermalConfig {
//!     shared: SharedConfig,
//!     cmd_msg_id: u16,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ThermalConfig::load(Path::new("/etc/fsw/thermal.toml"))?;
//!     config.shared.validate()?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// File exists but could not be read
    #[error("cannot read config file {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// TOML syntax or schema mismatch
    #[error("config parse failed: {0}")]
    ParseError(String),

    /// Parsed, but a value is out of bounds
    #[error("config rejected: {0}")]
    ValidationError(String),
}

/// Verbosity for the process-wide `tracing` subscriber.
///
/// Written in lowercase in TOML (`log_level = "warn"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&tracing::Level::from(*self), f)
    }
}

/// The `[shared]` table every app config carries.
///
/// ```toml
/// [shared]
/// service_name = "sample-app"
/// log_level = "debug"       # optional, defaults to info
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Name used in the init event and log lines.
    pub service_name: String,
}

impl SharedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shared.service_name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read and deserialize a TOML config.
///
/// Only syntax and schema are checked here; semantic checks belong to each
/// config type's own `validate`.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::from_toml(&text)
    }

    fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
