//! Flight-software common library
//!
//! This crate provides shared constants, configuration loading utilities
//! and event reporting for all workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Framework-wide limits (function codes, queue depth, tables)
//! - [`config`] - Configuration loading traits and types
//! - [`events`] - Event reporting sink (severity + text)
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use fsw_common::config::{ConfigLoader, SharedConfig};
//! use fsw_common::consts::MAX_FUNCTION_CODES;
//! ```

pub mod config;
pub mod consts;
pub mod events;
pub mod prelude;
