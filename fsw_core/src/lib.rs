//! # Flight-Software App Framework Core
//!
//! The pieces every application built on the framework shares:
//!
//! 1. **[`cmd`]**: Command dispatcher. Validates a command packet (length,
//!    checksum) and invokes the handler bound to its function code.
//! 2. **[`child`]**: Child-task command queue. A bounded single-producer /
//!    single-consumer ring that re-dispatches selected commands in a worker
//!    thread without ever blocking the producer.
//! 3. **[`table`]**: Table registry. Standard load/dump command surface and
//!    status bookkeeping over app-supplied load/dump callbacks.
//! 4. **[`loader`]**: Declarative object loader. Binds JSON key paths to
//!    typed destinations.
//!
//! [`msg`] holds the command packet layout shared by all of the above.
//!
//! ## Data Flow
//!
//! ```text
//! transport ──► CmdDispatcher ──► handler
//!                    │
//!                    └─► ChildProducer ══ring══► ChildConsumer ──► CmdDispatcher (worker)
//!
//! load/dump cmd ──► TableRegistry ──► app load_fn ──► ObjectLoader
//! ```

pub mod child;
pub mod cmd;
pub mod error;
pub mod loader;
pub mod msg;
pub mod table;

pub use error::{ChildError, CmdError, LoaderError, MsgError, TableError};
