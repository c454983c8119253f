//! Counting semaphore used to wake the child task.
//!
//! The count equals the number of pending wake-ups. The semaphore can be
//! invalidated, which both refuses further use by the producer and releases
//! a blocked waiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Outcome of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// One signal consumed.
    Signalled,
    /// Semaphore invalidated while (or before) waiting.
    Invalidated,
    /// Timed wait expired with no signal.
    TimedOut,
}

/// Counting semaphore with an explicit valid/invalid state.
#[derive(Debug)]
pub struct CountingSemaphore {
    count: Mutex<usize>,
    cond: Condvar,
    valid: AtomicBool,
}

impl CountingSemaphore {
    /// Create a valid semaphore holding `initial` signals.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
            valid: AtomicBool::new(true),
        }
    }

    /// Add one signal and wake a waiter.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_one();
    }

    /// Block until a signal is available or the semaphore is invalidated.
    pub fn wait(&self) -> Wake {
        let mut count = self.count.lock();
        loop {
            if !self.is_valid() {
                return Wake::Invalidated;
            }
            if *count > 0 {
                *count -= 1;
                return Wake::Signalled;
            }
            self.cond.wait(&mut count);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Wake {
        let mut count = self.count.lock();
        loop {
            if !self.is_valid() {
                return Wake::Invalidated;
            }
            if *count > 0 {
                *count -= 1;
                return Wake::Signalled;
            }
            if self.cond.wait_for(&mut count, timeout).timed_out() {
                return if *count > 0 && self.is_valid() {
                    *count -= 1;
                    Wake::Signalled
                } else {
                    Wake::TimedOut
                };
            }
        }
    }

    /// Pending signals.
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Mark the semaphore unusable and release any waiter.
    pub fn invalidate(&self) {
        let _count = self.count.lock();
        self.valid.store(false, Ordering::Release);
        self.cond.notify_all();
    }

    /// False once [`invalidate`](Self::invalidate) has been called.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}
