//! Framework-wide constants.
//!
//! Single source of truth for all numeric limits and default paths.
//! Imported by all crates.

use static_assertions::const_assert;

/// Number of function-code slots in a command dispatcher.
///
/// Function codes are carried in the low 7 bits of the command header,
/// so this never exceeds 128.
pub const MAX_FUNCTION_CODES: usize = 32;

/// Largest command packet (header + payload) a child-task queue entry holds.
pub const MAX_CMD_LEN: usize = 256;

/// Default number of entries in a child-task command queue.
pub const CHILD_QUEUE_DEPTH: usize = 8;

/// Maximum number of tables one app may register.
pub const MAX_TABLES_PER_APP: usize = 5;

/// Maximum number of object descriptors processed by one array load.
pub const MAX_LOADER_OBJECTS: usize = 128;

/// Fixed width of a filename field inside a command payload.
pub const FILENAME_FIELD_LEN: usize = 64;

/// Largest table file the loader will read into memory.
pub const MAX_TABLE_FILE_LEN: usize = 16 * 1024;

/// Default number of work units between cooperative child-task pauses.
pub const CHILD_PAUSE_BLOCK_LIMIT: u32 = 1000;

/// Default child-task pause duration in milliseconds.
pub const CHILD_PAUSE_DELAY_MS: u64 = 5;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fsw/app.toml";

const_assert!(MAX_FUNCTION_CODES <= 128);
const_assert!(MAX_CMD_LEN >= 8 + 2 + FILENAME_FIELD_LEN);
const_assert!(CHILD_QUEUE_DEPTH > 0);
const_assert!(MAX_TABLES_PER_APP <= u8::MAX as usize);
