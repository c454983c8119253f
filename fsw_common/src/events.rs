//! Event reporting.
//!
//! Framework components never log directly to a transport. Every rejection,
//! status change and fatal condition is handed to an [`EventSink`] as an
//! `(id, kind, text)` triple. The default [`TracingSink`] forwards events to
//! `tracing`; [`MemorySink`] records them for inspection (tests, telemetry).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Development detail, normally filtered.
    Debug,
    /// Nominal operation (command accepted, table loaded).
    Info,
    /// Recoverable failure (command rejected, load failed).
    Error,
    /// Unrecoverable failure of a task.
    Critical,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event identifier, see [`eid`].
    pub id: u16,
    /// Severity.
    pub kind: EventKind,
    /// Human-readable message.
    pub text: String,
}

/// Destination for framework events.
pub trait EventSink: Send + Sync {
    /// Report one event.
    fn send(&self, id: u16, kind: EventKind, text: &str);
}

/// Shared handle to an event sink. Cloned into every framework component.
pub type SharedSink = Arc<dyn EventSink>;

/// Sink that forwards every event to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn send(&self, id: u16, kind: EventKind, text: &str) {
        match kind {
            EventKind::Debug => tracing::debug!(event_id = id, "{text}"),
            EventKind::Info => tracing::info!(event_id = id, "{text}"),
            EventKind::Error => tracing::warn!(event_id = id, "{text}"),
            EventKind::Critical => tracing::error!(event_id = id, critical = true, "{text}"),
        }
    }
}

/// Convenience constructor for the default sink.
pub fn tracing_sink() -> SharedSink {
    Arc::new(TracingSink)
}

/// Sink that keeps every event in memory.
///
/// Events are also forwarded to `tracing` so a recording sink does not
/// silence the log.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Create an empty recording sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of recorded events with the given id.
    pub fn count(&self, id: u16) -> usize {
        self.events.lock().iter().filter(|e| e.id == id).count()
    }

    /// True if an event with `id` was reported.
    pub fn contains(&self, id: u16) -> bool {
        self.count(id) > 0
    }

    /// Most recent event, if any.
    pub fn last(&self) -> Option<Event> {
        self.events.lock().last().cloned()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn send(&self, id: u16, kind: EventKind, text: &str) {
        TracingSink.send(id, kind, text);
        self.events.lock().push(Event {
            id,
            kind,
            text: text.to_string(),
        });
    }
}

/// Event identifiers, grouped by component.
pub mod eid {
    // ── Command dispatcher ──
    /// Function code unregistered or out of range.
    pub const CMD_INVALID_FUNC_CODE: u16 = 101;
    /// Declared payload length differs from the registered length.
    pub const CMD_INVALID_LENGTH: u16 = 102;
    /// Header checksum failed.
    pub const CMD_INVALID_CHECKSUM: u16 = 103;
    /// Buffer could not be decoded as a command packet.
    pub const CMD_MALFORMED: u16 = 104;
    /// Registration rejected.
    pub const CMD_REGISTER_ERR: u16 = 105;
    /// Boolean command argument outside {0, 1}.
    pub const CMD_INVALID_BOOL: u16 = 106;

    // ── Child-task queue ──
    /// Enqueue rejected, worker not running.
    pub const CHILD_DISABLED: u16 = 201;
    /// Enqueue rejected, queue full.
    pub const CHILD_QUEUE_FULL: u16 = 202;
    /// Queue occupancy or index outside its valid range.
    pub const CHILD_CORRUPTED: u16 = 203;
    /// Command larger than a queue entry.
    pub const CHILD_OVERSIZE: u16 = 204;
    /// Semaphore signalled with an empty queue.
    pub const CHILD_EMPTY_ON_WAKE: u16 = 205;
    /// Worker loop started.
    pub const CHILD_START: u16 = 206;
    /// Worker loop terminated.
    pub const CHILD_EXIT: u16 = 207;

    // ── Table registry ──
    /// Table id not registered.
    pub const TBL_INVALID_ID: u16 = 301;
    /// Slot pool exhausted.
    pub const TBL_REGISTRY_FULL: u16 = 302;
    /// Table registered.
    pub const TBL_REGISTER: u16 = 303;
    /// Table load succeeded.
    pub const TBL_LOAD: u16 = 304;
    /// Table load failed.
    pub const TBL_LOAD_ERR: u16 = 305;
    /// Table dump succeeded.
    pub const TBL_DUMP: u16 = 306;
    /// Table dump failed.
    pub const TBL_DUMP_ERR: u16 = 307;
    /// Load/dump command payload could not be decoded.
    pub const TBL_CMD_ERR: u16 = 308;

    // ── Object loader ──
    /// Required key missing from the document.
    pub const LOADER_MISSING: u16 = 401;
    /// Document value type does not match the descriptor.
    pub const LOADER_TYPE: u16 = 402;
    /// String longer than the destination.
    pub const LOADER_STRING_LEN: u16 = 403;
    /// Numeric value could not be converted.
    pub const LOADER_NUMBER: u16 = 404;
    /// Descriptor array larger than the configured maximum.
    pub const LOADER_TOO_MANY: u16 = 405;
    /// File could not be read or parsed.
    pub const LOADER_FILE: u16 = 406;
    /// Malformed key path.
    pub const LOADER_KEY: u16 = 407;
}
