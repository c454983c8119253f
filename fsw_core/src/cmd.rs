//! Command dispatcher.
//!
//! A fixed array of function-code bindings. Each binding owns a handler
//! closure, the exact payload length the command must carry, and a counting
//! mode. [`CmdDispatcher::dispatch`] validates a packet before the handler
//! ever sees it:
//!
//! 1. header decodes and its length field matches the buffer;
//! 2. function code is registered;
//! 3. payload length equals the registered length;
//! 4. checksum verifies.
//!
//! Any failure is reported and counted invalid; the dispatcher keeps going.
//!
//! The dispatcher is generic over a context `C` which every handler receives
//! mutably alongside the raw packet. One dispatcher exists per task and is
//! never shared across tasks.

use fsw_common::consts::MAX_FUNCTION_CODES;
use fsw_common::events::{EventKind, SharedSink, eid};
use serde::Serialize;

use crate::error::CmdError;
use crate::msg::CmdView;

/// Handler bound to a function code. Returns `true` if the command was valid.
pub type CmdFn<C> = Box<dyn FnMut(&mut C, &[u8]) -> bool + Send>;

/// Where a binding's valid/invalid outcomes are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountingMode {
    /// Dispatcher-wide counters.
    #[default]
    Shared,
    /// The binding's own counters.
    ///
    /// Used for commands forwarded to a child task so that the enqueue step
    /// and the eventual execution are not both counted by the main task.
    Private,
}

/// Counters kept by a private-mode binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BindingCounts {
    /// Accepted commands.
    pub valid: u16,
    /// Rejected commands.
    pub invalid: u16,
}

struct Binding<C> {
    handler: Option<CmdFn<C>>,
    expected_len: usize,
    mode: CountingMode,
    counts: BindingCounts,
}

impl<C> Binding<C> {
    const fn unbound() -> Self {
        Self {
            handler: None,
            expected_len: 0,
            mode: CountingMode::Shared,
            counts: BindingCounts {
                valid: 0,
                invalid: 0,
            },
        }
    }
}

/// Function-code dispatcher for one task.
pub struct CmdDispatcher<C> {
    bindings: [Binding<C>; MAX_FUNCTION_CODES],
    valid_count: u16,
    invalid_count: u16,
    events: SharedSink,
}

impl<C> CmdDispatcher<C> {
    /// Create a dispatcher with every function code unbound.
    pub fn new(events: SharedSink) -> Self {
        Self {
            bindings: std::array::from_fn(|_| Binding::unbound()),
            valid_count: 0,
            invalid_count: 0,
            events,
        }
    }

    /// Bind `handler` to `code`, counting outcomes in the shared counters.
    ///
    /// Re-registering a code replaces the previous binding.
    pub fn register<F>(&mut self, code: u16, expected_len: usize, handler: F) -> Result<(), CmdError>
    where
        F: FnMut(&mut C, &[u8]) -> bool + Send + 'static,
    {
        self.bind(code, expected_len, CountingMode::Shared, Box::new(handler))
    }

    /// Bind `handler` to `code`, counting outcomes in the binding's own counters.
    pub fn register_private<F>(
        &mut self,
        code: u16,
        expected_len: usize,
        handler: F,
    ) -> Result<(), CmdError>
    where
        F: FnMut(&mut C, &[u8]) -> bool + Send + 'static,
    {
        self.bind(code, expected_len, CountingMode::Private, Box::new(handler))
    }

    fn bind(
        &mut self,
        code: u16,
        expected_len: usize,
        mode: CountingMode,
        handler: CmdFn<C>,
    ) -> Result<(), CmdError> {
        let Some(binding) = self.bindings.get_mut(usize::from(code)) else {
            self.events.send(
                eid::CMD_REGISTER_ERR,
                EventKind::Error,
                &format!("Registration rejected: function code {code} >= {MAX_FUNCTION_CODES}"),
            );
            return Err(CmdError::InvalidFunctionCode {
                code,
                max: MAX_FUNCTION_CODES,
            });
        };
        if binding.handler.is_some() {
            tracing::debug!(code, "replacing existing command binding");
        }
        *binding = Binding {
            handler: Some(handler),
            expected_len,
            mode,
            counts: BindingCounts::default(),
        };
        Ok(())
    }

    /// Validate `buf` and invoke the bound handler.
    ///
    /// Returns `true` if the command was accepted by its handler.
    pub fn dispatch(&mut self, ctx: &mut C, buf: &[u8]) -> bool {
        let view = match CmdView::parse(buf) {
            Ok(view) => view,
            Err(e) => {
                self.invalid_count = self.invalid_count.wrapping_add(1);
                self.events
                    .send(eid::CMD_MALFORMED, EventKind::Error, &format!("Malformed command: {e}"));
                return false;
            }
        };

        let code = view.function_code();
        let bound = self
            .bindings
            .get_mut(usize::from(code))
            .filter(|b| b.handler.is_some());
        let Some(binding) = bound else {
            self.invalid_count = self.invalid_count.wrapping_add(1);
            self.events.send(
                eid::CMD_INVALID_FUNC_CODE,
                EventKind::Error,
                &format!(
                    "Invalid function code {code} for message id 0x{:04X}",
                    view.msg_id()
                ),
            );
            return false;
        };

        let valid = if view.payload_len() != binding.expected_len {
            self.events.send(
                eid::CMD_INVALID_LENGTH,
                EventKind::Error,
                &format!(
                    "Invalid command payload length {} for function code {code}, expected {}",
                    view.payload_len(),
                    binding.expected_len
                ),
            );
            false
        } else if !view.checksum_valid() {
            self.events.send(
                eid::CMD_INVALID_CHECKSUM,
                EventKind::Error,
                &format!("Invalid checksum for function code {code}"),
            );
            false
        } else {
            match binding.handler.as_mut() {
                Some(handler) => handler(ctx, buf),
                None => false,
            }
        };

        match binding.mode {
            CountingMode::Shared => {
                if valid {
                    self.valid_count = self.valid_count.wrapping_add(1);
                } else {
                    self.invalid_count = self.invalid_count.wrapping_add(1);
                }
            }
            CountingMode::Private => {
                if valid {
                    binding.counts.valid = binding.counts.valid.wrapping_add(1);
                } else {
                    binding.counts.invalid = binding.counts.invalid.wrapping_add(1);
                }
            }
        }
        valid
    }

    /// Commands accepted and counted in the shared counters.
    pub const fn valid_count(&self) -> u16 {
        self.valid_count
    }

    /// Commands rejected and counted in the shared counters.
    pub const fn invalid_count(&self) -> u16 {
        self.invalid_count
    }

    /// Private counters of a registered code, `None` if unbound or shared.
    pub fn binding_counts(&self, code: u16) -> Option<BindingCounts> {
        self.bindings
            .get(usize::from(code))
            .filter(|b| b.handler.is_some() && b.mode == CountingMode::Private)
            .map(|b| b.counts)
    }

    /// True if `code` has a handler.
    pub fn is_registered(&self, code: u16) -> bool {
        self.bindings
            .get(usize::from(code))
            .is_some_and(|b| b.handler.is_some())
    }

    /// Zero shared and private counters.
    pub fn reset_status(&mut self) {
        self.valid_count = 0;
        self.invalid_count = 0;
        for binding in &mut self.bindings {
            binding.counts = BindingCounts::default();
        }
    }

    /// Event sink this dispatcher reports to.
    pub fn events(&self) -> &SharedSink {
        &self.events
    }
}

/// Validate a boolean command argument, reporting values outside {0, 1}.
pub fn valid_bool_arg(events: &SharedSink, arg: u8) -> Option<bool> {
    match arg {
        0 => Some(false),
        1 => Some(true),
        other => {
            events.send(
                eid::CMD_INVALID_BOOL,
                EventKind::Error,
                &format!("Invalid boolean command argument {other}, must be 0 or 1"),
            );
            None
        }
    }
}

/// Telemetry/event text for a boolean.
pub const fn bool_str(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}
