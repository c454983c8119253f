//! Prelude module for common re-exports.
//!
//! ```rust
//! use fsw_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Framework Limits ───────────────────────────────────────────────
pub use crate::consts::{
    CHILD_QUEUE_DEPTH, MAX_CMD_LEN, MAX_FUNCTION_CODES, MAX_LOADER_OBJECTS, MAX_TABLES_PER_APP,
};

// ─── Events ─────────────────────────────────────────────────────────
pub use crate::events::{EventKind, EventSink, MemorySink, SharedSink, TracingSink, eid};
