//! Child-task command adapter.
//!
//! Lets a main task hand long-running commands to a dedicated worker thread
//! without blocking. The main dispatcher binds a function code to
//! [`ChildProducer::invoke_child_cmd`]; the worker owns the matching
//! [`ChildConsumer`] and its own [`CmdDispatcher`](crate::cmd::CmdDispatcher).
//!
//! ```text
//!  main task                         worker task
//!  ─────────                         ───────────
//!  enqueue ──► [ ring of N entries ] ──► dequeue ──► dispatch
//!     │               count (mutex)          ▲
//!     └─────────► semaphore signal ──────────┘
//! ```
//!
//! The adapter is enabled while the semaphore is valid. It becomes disabled
//! when the worker exits, when the consumer is dropped, on a fatal queue
//! error, or on [`ChildProducer::shutdown`].

mod queue;
mod semaphore;
mod worker;

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::time::Duration;

use fsw_common::consts::{CHILD_PAUSE_BLOCK_LIMIT, CHILD_PAUSE_DELAY_MS};
use serde::Serialize;

pub use queue::{ChildConsumer, ChildProducer, ChildQueue, QueueEntry};
pub use semaphore::{CountingSemaphore, Wake};
pub use worker::{ChildWorker, ExitReason, WorkerExit};

/// Marker stored while no command has been executed.
const NO_FUNCTION_CODE: u16 = u16::MAX;

/// Child-task telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChildStatus {
    /// Adapter accepts commands.
    pub enabled: bool,
    /// Entries waiting in the queue.
    pub queue_count: usize,
    /// Queue depth.
    pub depth: usize,
    /// Commands the worker executed successfully.
    pub valid_count: u16,
    /// Commands the worker rejected.
    pub invalid_count: u16,
    /// Function code currently or most recently executing.
    pub curr_fc: Option<u16>,
    /// Function code executed before `curr_fc`.
    pub prev_fc: Option<u16>,
}

/// Worker counters, written by the worker and read by the main task.
///
/// `fc_pair` holds the current function code in the high half and the
/// previous one in the low half so readers always see a matching pair.
#[derive(Debug)]
struct WorkerStats {
    valid: AtomicU16,
    invalid: AtomicU16,
    fc_pair: AtomicU32,
}

const fn pack_fc(curr: u16, prev: u16) -> u32 {
    ((curr as u32) << 16) | prev as u32
}

const fn unpack_fc(pair: u32) -> (u16, u16) {
    ((pair >> 16) as u16, pair as u16)
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            valid: AtomicU16::new(0),
            invalid: AtomicU16::new(0),
            fc_pair: AtomicU32::new(pack_fc(NO_FUNCTION_CODE, NO_FUNCTION_CODE)),
        }
    }
}

impl WorkerStats {
    /// Only the worker writes `fc_pair`, so load then store cannot lose an update.
    fn begin(&self, fc: Option<u16>) {
        let (curr, _) = unpack_fc(self.fc_pair.load(Ordering::Relaxed));
        let next = pack_fc(fc.unwrap_or(NO_FUNCTION_CODE), curr);
        self.fc_pair.store(next, Ordering::Relaxed);
    }

    fn record(&self, valid: bool) {
        let counter = if valid { &self.valid } else { &self.invalid };
        // fetch_add wraps on overflow
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.valid.store(0, Ordering::Relaxed);
        self.invalid.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self, enabled: bool, queue_count: usize, depth: usize) -> ChildStatus {
        let fc = |v: u16| Some(v).filter(|&v| v != NO_FUNCTION_CODE);
        let (curr, prev) = unpack_fc(self.fc_pair.load(Ordering::Relaxed));
        ChildStatus {
            enabled,
            queue_count,
            depth,
            valid_count: self.valid.load(Ordering::Relaxed),
            invalid_count: self.invalid.load(Ordering::Relaxed),
            curr_fc: fc(curr),
            prev_fc: fc(prev),
        }
    }
}

/// Count one unit of work and sleep once `block_limit` units have accrued.
///
/// Returns `true` if it paused. Long-running child commands call this inside
/// their loops so the worker yields the CPU regularly.
pub fn pause(block_counter: &mut u32, block_limit: u32, delay: Duration) -> bool {
    *block_counter = block_counter.saturating_add(1);
    if *block_counter < block_limit {
        return false;
    }
    std::thread::sleep(delay);
    *block_counter = 0;
    true
}

/// A block counter bundled with its limit and delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseBudget {
    limit: u32,
    delay: Duration,
    counter: u32,
}

impl Default for PauseBudget {
    fn default() -> Self {
        Self::new(
            CHILD_PAUSE_BLOCK_LIMIT,
            Duration::from_millis(CHILD_PAUSE_DELAY_MS),
        )
    }
}

impl PauseBudget {
    pub const fn new(limit: u32, delay: Duration) -> Self {
        Self {
            limit,
            delay,
            counter: 0,
        }
    }

    /// Count one unit of work, pausing when the budget is spent.
    #[inline]
    pub fn tick(&mut self) -> bool {
        pause(&mut self.counter, self.limit, self.delay)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    pub const fn counter(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_fires_on_limit_and_resets() {
        let mut counter = 0;
        let delay = Duration::from_millis(0);
        assert!(!pause(&mut counter, 3, delay));
        assert!(!pause(&mut counter, 3, delay));
        assert!(pause(&mut counter, 3, delay));
        assert_eq!(counter, 0);
        assert!(!pause(&mut counter, 3, delay));
        assert_eq!(counter, 1);
    }

    #[test]
    fn budget_ticks() {
        let mut budget = PauseBudget::new(2, Duration::ZERO);
        assert!(!budget.tick());
        assert!(budget.tick());
        assert_eq!(budget.counter(), 0);
        budget.tick();
        budget.reset();
        assert_eq!(budget.counter(), 0);
    }

    #[test]
    fn stats_track_function_codes() {
        let stats = WorkerStats::default();
        let s = stats.snapshot(true, 0, 8);
        assert_eq!((s.curr_fc, s.prev_fc), (None, None));

        stats.begin(Some(4));
        stats.record(true);
        stats.begin(Some(6));
        stats.record(false);

        let s = stats.snapshot(true, 1, 8);
        assert_eq!(s.curr_fc, Some(6));
        assert_eq!(s.prev_fc, Some(4));
        assert_eq!((s.valid_count, s.invalid_count), (1, 1));

        stats.reset();
        let s = stats.snapshot(true, 0, 8);
        assert_eq!((s.valid_count, s.invalid_count), (0, 0));
        assert_eq!(s.curr_fc, Some(6));
    }

    #[test]
    fn function_code_pair_never_tears() {
        let stats = std::sync::Arc::new(WorkerStats::default());
        let writer = {
            let stats = std::sync::Arc::clone(&stats);
            std::thread::spawn(move || {
                for fc in 0..5000u16 {
                    stats.begin(Some(fc));
                }
            })
        };
        while !writer.is_finished() {
            let s = stats.snapshot(true, 0, 8);
            if let (Some(curr), Some(prev)) = (s.curr_fc, s.prev_fc) {
                assert_eq!(curr, prev + 1);
            }
        }
        writer.join().unwrap();
        let s = stats.snapshot(true, 0, 8);
        assert_eq!((s.curr_fc, s.prev_fc), (Some(4999), Some(4998)));
    }
}
