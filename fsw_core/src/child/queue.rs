//! Bounded single-producer / single-consumer command ring.
//!
//! [`ChildQueue::create`] returns the two halves. Neither half is `Clone`,
//! so exactly one task can enqueue and exactly one can dequeue. The write
//! index lives in the producer and the read index in the consumer; the only
//! datum both halves mutate is the occupancy counter, and every change to it
//! happens under its mutex.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::time::Duration;

use fsw_common::consts::{CHILD_QUEUE_DEPTH, MAX_CMD_LEN};
use fsw_common::events::{EventKind, SharedSink, eid};
use parking_lot::Mutex;

use super::semaphore::{CountingSemaphore, Wake};
use super::{ChildStatus, WorkerStats};
use crate::cmd::CmdDispatcher;
use crate::error::ChildError;
use crate::msg::peek_function_code;

/// One queued command, stored by value.
pub type QueueEntry = heapless::Vec<u8, MAX_CMD_LEN>;

struct QueueShared<const N: usize> {
    entries: [UnsafeCell<QueueEntry>; N],
    count: Mutex<usize>,
    sem: CountingSemaphore,
    stats: WorkerStats,
    events: SharedSink,
}

// SAFETY: an entry is written only by the producer at `write_index` after it
// has observed `count < N`, and read only by the consumer at `read_index`
// after it has observed `count > 0`. Both observations go through the count
// mutex, and each side publishes its slot access by changing `count` under
// the same mutex afterwards, so the two sides never touch the same slot
// concurrently.
unsafe impl<const N: usize> Sync for QueueShared<N> {}

impl<const N: usize> QueueShared<N> {
    fn occupancy(&self) -> usize {
        *self.count.lock()
    }

    fn status(&self) -> ChildStatus {
        self.stats
            .snapshot(self.sem.is_valid(), self.occupancy(), N)
    }

    fn report(&self, err: &ChildError) {
        let (id, kind) = match err {
            ChildError::Disabled => (eid::CHILD_DISABLED, EventKind::Error),
            ChildError::QueueFull { .. } => (eid::CHILD_QUEUE_FULL, EventKind::Error),
            ChildError::Oversize { .. } => (eid::CHILD_OVERSIZE, EventKind::Error),
            ChildError::Corrupted { .. } => (eid::CHILD_CORRUPTED, EventKind::Critical),
            ChildError::EmptyOnWake => (eid::CHILD_EMPTY_ON_WAKE, EventKind::Critical),
            ChildError::Spawn(_) => (eid::CHILD_EXIT, EventKind::Critical),
        };
        self.events.send(id, kind, &err.to_string());
    }
}

/// Constructor for a producer/consumer pair.
pub struct ChildQueue<const N: usize = CHILD_QUEUE_DEPTH>;

impl<const N: usize> ChildQueue<N> {
    /// Create an empty queue of depth `N` with a valid semaphore.
    pub fn create(events: SharedSink) -> (ChildProducer<N>, ChildConsumer<N>) {
        let shared = Arc::new(QueueShared {
            entries: std::array::from_fn(|_| UnsafeCell::new(QueueEntry::new())),
            count: Mutex::new(0),
            sem: CountingSemaphore::new(0),
            stats: WorkerStats::default(),
            events,
        });
        (
            ChildProducer {
                shared: Arc::clone(&shared),
                write_index: 0,
            },
            ChildConsumer {
                shared,
                read_index: 0,
            },
        )
    }
}

/// Enqueueing half, owned by the main task. Never blocks.
pub struct ChildProducer<const N: usize = CHILD_QUEUE_DEPTH> {
    shared: Arc<QueueShared<N>>,
    write_index: usize,
}

impl<const N: usize> ChildProducer<N> {
    /// Copy `buf` into the next free entry and wake the worker.
    ///
    /// Guards, in order: adapter disabled, queue full, interface corrupted,
    /// oversize command. Every rejection is reported and leaves the queue
    /// unchanged.
    pub fn enqueue(&mut self, buf: &[u8]) -> Result<(), ChildError> {
        self.try_enqueue(buf).inspect_err(|e| self.shared.report(e))
    }

    fn try_enqueue(&mut self, buf: &[u8]) -> Result<(), ChildError> {
        let shared = &*self.shared;
        if !shared.sem.is_valid() {
            return Err(ChildError::Disabled);
        }

        let count = shared.occupancy();
        if count == N {
            return Err(ChildError::QueueFull { depth: N });
        }
        if count > N || self.write_index >= N {
            return Err(ChildError::Corrupted {
                count,
                index: self.write_index,
                depth: N,
            });
        }
        if buf.len() > MAX_CMD_LEN {
            return Err(ChildError::Oversize {
                len: buf.len(),
                max: MAX_CMD_LEN,
            });
        }

        // SAFETY: count < N, so the consumer is not reading this slot.
        let entry = unsafe { &mut *shared.entries[self.write_index].get() };
        entry.clear();
        if entry.extend_from_slice(buf).is_err() {
            return Err(ChildError::Oversize {
                len: buf.len(),
                max: MAX_CMD_LEN,
            });
        }

        self.write_index = (self.write_index + 1) % N;
        *shared.count.lock() += 1;
        shared.sem.signal();
        Ok(())
    }

    /// Handler body for a main-dispatcher binding that forwards the command.
    ///
    /// Register it with [`CmdDispatcher::register_private`] so the command is
    /// counted once by the main task (here) and once by the worker when it
    /// actually executes.
    pub fn invoke_child_cmd(&mut self, buf: &[u8]) -> bool {
        self.enqueue(buf).is_ok()
    }

    /// Stop accepting commands and release the worker.
    pub fn shutdown(&self) {
        self.shared.sem.invalidate();
    }

    /// False once the worker has exited or [`shutdown`](Self::shutdown) ran.
    pub fn is_enabled(&self) -> bool {
        self.shared.sem.is_valid()
    }

    /// Entries currently queued.
    pub fn queue_count(&self) -> usize {
        self.shared.occupancy()
    }

    /// Telemetry snapshot.
    pub fn status(&self) -> ChildStatus {
        self.shared.status()
    }

    /// Zero the worker's valid/invalid counters.
    pub fn reset_status(&self) {
        self.shared.stats.reset();
    }
}

/// Dequeueing half, owned by the worker task.
///
/// Dropping the consumer invalidates the semaphore so the producer stops
/// accepting commands nobody will execute.
pub struct ChildConsumer<const N: usize = CHILD_QUEUE_DEPTH> {
    shared: Arc<QueueShared<N>>,
    read_index: usize,
}

impl<const N: usize> ChildConsumer<N> {
    /// Block until a command is queued.
    ///
    /// Entries accepted before the adapter was disabled are still handed out
    /// in order. `Disabled` is returned once the queue is empty and means the
    /// caller should exit cleanly. `EmptyOnWake` and `Corrupted` are fatal:
    /// the semaphore is invalidated before they are returned.
    pub fn dequeue(&mut self) -> Result<QueueEntry, ChildError> {
        match self.shared.sem.wait() {
            Wake::Signalled => self.take(),
            Wake::Invalidated | Wake::TimedOut => self.take_pending(),
        }
    }

    /// Like [`dequeue`](Self::dequeue) but returns `Ok(None)` after `timeout`.
    pub fn dequeue_timeout(&mut self, timeout: Duration) -> Result<Option<QueueEntry>, ChildError> {
        match self.shared.sem.wait_timeout(timeout) {
            Wake::Signalled => self.take().map(Some),
            Wake::TimedOut => Ok(None),
            Wake::Invalidated => self.take_pending().map(Some),
        }
    }

    /// Dequeue one command and run it through the worker's dispatcher.
    ///
    /// Returns the dispatcher's verdict and updates worker telemetry.
    pub fn dequeue_and_dispatch<C>(
        &mut self,
        dispatcher: &mut CmdDispatcher<C>,
        ctx: &mut C,
    ) -> Result<bool, ChildError> {
        let entry = self.dequeue()?;
        self.shared.stats.begin(peek_function_code(&entry));
        let valid = dispatcher.dispatch(ctx, &entry);
        self.shared.stats.record(valid);
        Ok(valid)
    }

    /// Drain path once the semaphore is invalid.
    fn take_pending(&mut self) -> Result<QueueEntry, ChildError> {
        if self.shared.occupancy() == 0 {
            return Err(ChildError::Disabled);
        }
        self.take()
    }

    fn take(&mut self) -> Result<QueueEntry, ChildError> {
        self.try_take().inspect_err(|e| {
            self.shared.report(e);
            self.shared.sem.invalidate();
        })
    }

    fn try_take(&mut self) -> Result<QueueEntry, ChildError> {
        let shared = &*self.shared;
        let count = shared.occupancy();
        if count == 0 {
            return Err(ChildError::EmptyOnWake);
        }
        if count > N || self.read_index >= N {
            return Err(ChildError::Corrupted {
                count,
                index: self.read_index,
                depth: N,
            });
        }

        // SAFETY: count > 0, so the producer has finished writing this slot
        // and will not reuse it until `count` is decremented below.
        let entry = unsafe {
            std::mem::replace(&mut *shared.entries[self.read_index].get(), QueueEntry::new())
        };
        self.read_index = (self.read_index + 1) % N;
        *shared.count.lock() -= 1;
        Ok(entry)
    }

    /// Mark the adapter disabled without dropping the consumer.
    pub fn disable(&self) {
        self.shared.sem.invalidate();
    }

    /// Telemetry snapshot.
    pub fn status(&self) -> ChildStatus {
        self.shared.status()
    }

    pub(super) fn events(&self) -> &SharedSink {
        &self.shared.events
    }
}

impl<const N: usize> Drop for ChildConsumer<N> {
    fn drop(&mut self) {
        self.shared.sem.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::CmdPacket;
    use fsw_common::events::MemorySink;

    fn pkt(fc: u16, tag: u8) -> Vec<u8> {
        CmdPacket::build(0x1881, fc, &[tag]).unwrap()
    }

    #[test]
    fn enqueue_then_dequeue_in_order() {
        let (mut tx, mut rx) = ChildQueue::<4>::create(MemorySink::new());
        tx.enqueue(&pkt(1, 10)).unwrap();
        tx.enqueue(&pkt(1, 11)).unwrap();
        assert_eq!(tx.queue_count(), 2);

        assert_eq!(rx.dequeue().unwrap().as_slice(), pkt(1, 10).as_slice());
        assert_eq!(rx.dequeue().unwrap().as_slice(), pkt(1, 11).as_slice());
        assert_eq!(tx.queue_count(), 0);
    }

    #[test]
    fn indices_wrap_around() {
        let (mut tx, mut rx) = ChildQueue::<2>::create(MemorySink::new());
        for tag in 0..7u8 {
            tx.enqueue(&pkt(2, tag)).unwrap();
            assert_eq!(rx.dequeue().unwrap()[CMD_TAG], tag);
        }
        assert_eq!(tx.write_index, 1);
        assert_eq!(rx.read_index, 1);
    }

    const CMD_TAG: usize = 8;

    #[test]
    fn corrupted_write_index_rejected() {
        let sink = MemorySink::new();
        let (mut tx, _rx) = ChildQueue::<4>::create(sink.clone());
        tx.write_index = 9;
        assert_eq!(
            tx.enqueue(&pkt(1, 0)),
            Err(ChildError::Corrupted {
                count: 0,
                index: 9,
                depth: 4
            })
        );
        assert_eq!(tx.queue_count(), 0);
        assert!(sink.contains(eid::CHILD_CORRUPTED));
    }

    #[test]
    fn corrupted_count_rejected_by_producer() {
        let (mut tx, _rx) = ChildQueue::<4>::create(MemorySink::new());
        *tx.shared.count.lock() = 5;
        assert!(matches!(
            tx.enqueue(&pkt(1, 0)),
            Err(ChildError::Corrupted { count: 5, .. })
        ));
    }

    #[test]
    fn signal_without_entry_is_fatal() {
        let sink = MemorySink::new();
        let (tx, mut rx) = ChildQueue::<4>::create(sink.clone());
        rx.shared.sem.signal();
        assert_eq!(rx.dequeue().unwrap_err(), ChildError::EmptyOnWake);
        assert!(!tx.is_enabled());
        assert!(sink.contains(eid::CHILD_EMPTY_ON_WAKE));
    }

    #[test]
    fn read_index_out_of_range_is_fatal() {
        let (mut tx, mut rx) = ChildQueue::<4>::create(MemorySink::new());
        tx.enqueue(&pkt(1, 0)).unwrap();
        rx.read_index = 4;
        assert!(matches!(
            rx.dequeue(),
            Err(ChildError::Corrupted { index: 4, .. })
        ));
        assert!(!tx.is_enabled());
    }

    #[test]
    fn timed_dequeue_on_empty_queue() {
        let (_tx, mut rx) = ChildQueue::<4>::create(MemorySink::new());
        assert_eq!(rx.dequeue_timeout(Duration::from_millis(5)), Ok(None));
    }

    #[test]
    fn consumer_can_disable_adapter() {
        let (mut tx, mut rx) = ChildQueue::<4>::create(MemorySink::new());
        tx.enqueue(&pkt(1, 0)).unwrap();
        rx.disable();
        assert!(!rx.status().enabled);

        assert_eq!(tx.enqueue(&pkt(1, 1)), Err(ChildError::Disabled));
        assert_eq!(tx.queue_count(), 1);

        // already accepted entry still comes out, then the queue reports disabled
        assert_eq!(rx.dequeue().unwrap()[CMD_TAG], 0);
        assert_eq!(rx.dequeue().unwrap_err(), ChildError::Disabled);
        assert_eq!(tx.queue_count(), 0);
    }

    #[test]
    fn timed_dequeue_drains_after_shutdown() {
        let (mut tx, mut rx) = ChildQueue::<4>::create(MemorySink::new());
        tx.enqueue(&pkt(1, 5)).unwrap();
        tx.shutdown();
        let entry = rx.dequeue_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(entry.map(|e| e[CMD_TAG]), Some(5));
        assert_eq!(
            rx.dequeue_timeout(Duration::from_millis(5)),
            Err(ChildError::Disabled)
        );
    }

    #[test]
    fn dropping_consumer_disables_producer() {
        let sink = MemorySink::new();
        let (mut tx, rx) = ChildQueue::<4>::create(sink.clone());
        drop(rx);
        assert_eq!(tx.enqueue(&pkt(1, 0)), Err(ChildError::Disabled));
        assert_eq!(tx.queue_count(), 0);
        assert!(sink.contains(eid::CHILD_DISABLED));
    }
}
