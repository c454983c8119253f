//! Error types for framework operations

use thiserror::Error;

use crate::loader::ValueType;
use crate::msg::CMD_HDR_LEN;

/// Errors decoding or building a command packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MsgError {
    /// Buffer shorter than the fixed header
    #[error("Packet too short: {len} bytes (header is {hdr})", hdr = CMD_HDR_LEN)]
    TooShort {
        /// Buffer length
        len: usize,
    },

    /// Header length field disagrees with the buffer length
    #[error("Declared packet length {declared} does not match buffer length {actual}")]
    LengthMismatch {
        /// Total length derived from the header
        declared: usize,
        /// Actual buffer length
        actual: usize,
    },

    /// Function code does not fit the 7-bit header field
    #[error("Function code {0} exceeds the 7-bit header field")]
    FunctionCodeRange(u16),

    /// Payload too large for the 16-bit length field
    #[error("Payload of {len} bytes exceeds the packet length field")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
    },

    /// Payload shorter than the command structure being decoded
    #[error("Payload of {len} bytes is too short, expected {expected}")]
    PayloadTooShort {
        /// Payload length
        len: usize,
        /// Required length
        expected: usize,
    },

    /// Fixed-width text field is not valid UTF-8 or overflows its width
    #[error("Invalid fixed-width text field")]
    TextField,
}

/// Command dispatcher errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CmdError {
    /// Registration with a function code outside the binding table
    #[error("Function code {code} out of range (max {max})")]
    InvalidFunctionCode {
        /// Rejected function code
        code: u16,
        /// Number of binding slots
        max: usize,
    },
}

/// Child-task command queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChildError {
    /// Worker task not running (never started, exited or shut down)
    #[error("Child task is disabled")]
    Disabled,

    /// All entries occupied
    #[error("Child task queue full ({depth} entries)")]
    QueueFull {
        /// Queue depth
        depth: usize,
    },

    /// Occupancy counter or index outside its defined range
    #[error("Child task interface corrupted: count {count}, index {index}, depth {depth}")]
    Corrupted {
        /// Occupancy counter at detection
        count: usize,
        /// Offending index
        index: usize,
        /// Queue depth
        depth: usize,
    },

    /// Command larger than a queue entry
    #[error("Command of {len} bytes exceeds child queue entry capacity {max}")]
    Oversize {
        /// Command length
        len: usize,
        /// Entry capacity
        max: usize,
    },

    /// Semaphore woke the worker while the queue was empty
    #[error("Child task woke with an empty queue")]
    EmptyOnWake,

    /// Worker thread could not be started
    #[error("Failed to spawn child task: {0}")]
    Spawn(String),
}

impl ChildError {
    /// True for invariant violations that must terminate the worker.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::EmptyOnWake)
    }
}

/// Declarative object loader errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// Key path not present in the document
    #[error("Key '{key}' not found")]
    Missing {
        /// Query key
        key: String,
    },

    /// Key path syntax invalid
    #[error("Malformed key path '{key}'")]
    BadKeyPath {
        /// Query key
        key: String,
    },

    /// Document value has a different type than the descriptor
    #[error("Key '{key}' expects {expected} but document holds {found}")]
    TypeMismatch {
        /// Query key
        key: String,
        /// Descriptor type
        expected: ValueType,
        /// JSON type name of the value
        found: &'static str,
    },

    /// String does not fit the destination including terminator
    #[error("String for '{key}' has {len} bytes, destination holds {size} including terminator")]
    StringTooLong {
        /// Query key
        key: String,
        /// String length in bytes
        len: usize,
        /// Destination size
        size: usize,
    },

    /// Number could not be parsed in the descriptor's numeric mode
    #[error("Key '{key}' value {text} is not a valid {expected}")]
    NumberParse {
        /// Query key
        key: String,
        /// Numeric text from the document
        text: String,
        /// Descriptor type
        expected: ValueType,
    },

    /// Number does not fit the destination width
    #[error("Key '{key}' value {text} is out of range for a {size}-byte destination")]
    OutOfRange {
        /// Query key
        key: String,
        /// Numeric text from the document
        text: String,
        /// Destination size
        size: usize,
    },

    /// Descriptor array larger than the configured maximum
    #[error("{count} objects exceed the loader maximum of {max}")]
    TooManyObjects {
        /// Descriptors supplied
        count: usize,
        /// Maximum
        max: usize,
    },

    /// File contains no data
    #[error("File {path} is empty")]
    EmptyFile {
        /// File path
        path: String,
    },

    /// File larger than the read buffer
    #[error("File {path} has {len} bytes, maximum is {max}")]
    FileTooLarge {
        /// File path
        path: String,
        /// File size
        len: u64,
        /// Maximum size
        max: usize,
    },

    /// File could not be read
    #[error("Failed to read {path}: {reason}")]
    Io {
        /// File path
        path: String,
        /// OS error text
        reason: String,
    },

    /// Text is not a valid JSON document
    #[error("Document parse error: {0}")]
    Parse(String),
}

/// Table registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// Table id not registered
    #[error("Invalid table id {0}")]
    UnknownId(u8),

    /// Slot pool exhausted
    #[error("Table registry full ({max} tables)")]
    RegistryFull {
        /// Pool size
        max: usize,
    },

    /// Load source cannot be opened
    #[error("Table file {path} is not readable: {reason}")]
    FileNotReadable {
        /// File path
        path: String,
        /// OS error text
        reason: String,
    },

    /// Dump target directory missing or read-only
    #[error("Directory for dump file {path} is not writable")]
    DirNotWritable {
        /// File path
        path: String,
    },

    /// Unknown load type in a load command
    #[error("Invalid table load type {0}")]
    InvalidLoadType(u8),

    /// Fewer objects than the table's load policy accepts
    #[error("Table load found {found} of {expected} objects")]
    Incomplete {
        /// Objects resolved
        found: usize,
        /// Objects defined
        expected: usize,
    },

    /// Component-specific semantic validation failed
    #[error("Table validation failed: {0}")]
    Validation(String),

    /// Dump could not be written
    #[error("Failed to write dump {path}: {reason}")]
    DumpWrite {
        /// File path
        path: String,
        /// Error text
        reason: String,
    },

    /// Document-level loader failure
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// Command payload could not be decoded
    #[error(transparent)]
    Msg(#[from] MsgError),
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_child_errors() {
        assert!(ChildError::EmptyOnWake.is_fatal());
        assert!(
            ChildError::Corrupted {
                count: 9,
                index: 0,
                depth: 8
            }
            .is_fatal()
        );
        assert!(!ChildError::Disabled.is_fatal());
        assert!(!ChildError::QueueFull { depth: 8 }.is_fatal());
        assert!(!ChildError::Oversize { len: 300, max: 256 }.is_fatal());
    }

    #[test]
    fn loader_error_converts_into_table_error() {
        let err: TableError = LoaderError::Missing { key: "a.b".into() }.into();
        assert_eq!(err.to_string(), "Key 'a.b' not found");
    }

    #[test]
    fn disabled_message_text() {
        assert_eq!(ChildError::Disabled.to_string(), "Child task is disabled");
    }
}
