//! # Sample App
//!
//! A complete app built on `fsw_core`: a main command dispatcher, two
//! tables loaded at start-up, and a compute command executed in a child
//! task.
//!
//! - [`app`]: app assembly and housekeeping status
//! - [`tables`]: limits and params tables
//! - [`compute`]: the child-task command
//! - [`harness`]: text command script to packets
//! - [`config`]: TOML configuration

pub mod app;
pub mod compute;
pub mod config;
pub mod error;
pub mod harness;
pub mod tables;

pub use app::{AppStatus, SampleApp};
pub use config::AppConfig;
pub use error::AppError;

/// Sample app event ids.
pub mod eid {
    pub const APP_INIT: u16 = 1;
    pub const APP_NOOP: u16 = 2;
    pub const APP_RESET: u16 = 3;
    pub const APP_ENABLE: u16 = 4;
    pub const COMPUTE_DONE: u16 = 10;
    pub const COMPUTE_ERR: u16 = 11;
}
