//! Sample app errors

use fsw_common::config::ConfigError;
use fsw_core::{ChildError, CmdError, MsgError, TableError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command registration failed: {0}")]
    Cmd(#[from] CmdError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Child task error: {0}")]
    Child(#[from] ChildError),

    #[error("Packet error: {0}")]
    Msg(#[from] MsgError),

    /// Command script line could not be turned into a packet
    #[error("Line {line}: {reason}")]
    Script { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
