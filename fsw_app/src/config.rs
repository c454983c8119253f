//! Sample app configuration.
//!
//! ```toml
//! [shared]
//! service_name = "sample-app"
//! log_level = "info"
//!
//! [app]
//! cmd_msg_id = 6272
//! limits_table = "tables/limits.json"
//! params_table = "tables/params.json"
//! dump_dir = "/tmp"
//!
//! [child]
//! block_limit = 1000
//! block_delay_ms = 5
//! ```
//!
//! Relative table paths are resolved against the directory holding the
//! config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fsw_common::config::{ConfigError, ConfigLoader, SharedConfig};
use fsw_common::consts::{CHILD_PAUSE_BLOCK_LIMIT, CHILD_PAUSE_DELAY_MS};
use fsw_core::child::PauseBudget;
use serde::Deserialize;

/// Default command message id.
pub const DEFAULT_CMD_MSG_ID: u16 = 0x1880;

/// Longest pause a child command may request per block.
const MAX_BLOCK_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub shared: SharedConfig,
    pub app: AppSection,
    #[serde(default)]
    pub child: ChildSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_cmd_msg_id")]
    pub cmd_msg_id: u16,
    /// Default file for the limits table.
    pub limits_table: PathBuf,
    /// Default file for the params table.
    pub params_table: PathBuf,
    /// Directory for table dumps requested without a directory.
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
}

/// Cooperative pause settings for the compute command.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChildSection {
    #[serde(default = "default_block_limit")]
    pub block_limit: u32,
    #[serde(default = "default_block_delay_ms")]
    pub block_delay_ms: u64,
}

impl Default for ChildSection {
    fn default() -> Self {
        Self {
            block_limit: CHILD_PAUSE_BLOCK_LIMIT,
            block_delay_ms: CHILD_PAUSE_DELAY_MS,
        }
    }
}

impl ChildSection {
    pub fn pause_budget(&self) -> PauseBudget {
        PauseBudget::new(self.block_limit, Duration::from_millis(self.block_delay_ms))
    }
}

fn default_cmd_msg_id() -> u16 {
    DEFAULT_CMD_MSG_ID
}

fn default_dump_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_block_limit() -> u32 {
    CHILD_PAUSE_BLOCK_LIMIT
}

fn default_block_delay_ms() -> u64 {
    CHILD_PAUSE_DELAY_MS
}

impl AppConfig {
    /// Load, validate and resolve relative paths against the config's directory.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.validate()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Semantic checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.child.block_limit == 0 {
            return Err(ConfigError::ValidationError(
                "child.block_limit must be at least 1".to_string(),
            ));
        }
        if self.child.block_delay_ms > MAX_BLOCK_DELAY_MS {
            return Err(ConfigError::ValidationError(format!(
                "child.block_delay_ms {} exceeds {MAX_BLOCK_DELAY_MS}",
                self.child.block_delay_ms
            )));
        }
        for (key, path) in [
            ("app.limits_table", &self.app.limits_table),
            ("app.params_table", &self.app.params_table),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{key} cannot be empty"
                )));
            }
        }
        Ok(())
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.app.limits_table,
            &mut self.app.params_table,
            &mut self.app.dump_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
