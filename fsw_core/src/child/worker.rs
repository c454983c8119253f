//! Worker task loop.

use std::thread::{self, JoinHandle};

use fsw_common::consts::CHILD_QUEUE_DEPTH;
use fsw_common::events::{EventKind, eid};
use tracing::{debug, info};

use super::queue::ChildConsumer;
use crate::cmd::CmdDispatcher;
use crate::error::ChildError;

/// Why the worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Adapter was shut down or the producer went away.
    Disabled,
    /// Queue invariant violated.
    Fatal(ChildError),
}

/// Returned from [`ChildWorker::run`] so the owner can inspect final state.
pub struct WorkerExit<C> {
    pub ctx: C,
    pub dispatcher: CmdDispatcher<C>,
    pub reason: ExitReason,
}

/// Worker task: a consumer, the worker's dispatcher and its context.
pub struct ChildWorker<C, const N: usize = CHILD_QUEUE_DEPTH> {
    consumer: ChildConsumer<N>,
    dispatcher: CmdDispatcher<C>,
    ctx: C,
}

impl<C, const N: usize> ChildWorker<C, N> {
    pub fn new(consumer: ChildConsumer<N>, dispatcher: CmdDispatcher<C>, ctx: C) -> Self {
        Self {
            consumer,
            dispatcher,
            ctx,
        }
    }

    /// Dequeue and dispatch until the adapter is disabled and the queue has
    /// drained, or until a fatal error.
    ///
    /// The consumer is dropped on return, which disables the adapter for the
    /// producer.
    pub fn run(self) -> WorkerExit<C> {
        let Self {
            mut consumer,
            mut dispatcher,
            mut ctx,
        } = self;
        let events = consumer.events().clone();
        events.send(eid::CHILD_START, EventKind::Info, "Child task started");

        let reason = loop {
            match consumer.dequeue_and_dispatch(&mut dispatcher, &mut ctx) {
                Ok(valid) => debug!(valid, "child command executed"),
                Err(ChildError::Disabled) => break ExitReason::Disabled,
                Err(e) if e.is_fatal() => break ExitReason::Fatal(e),
                Err(e) => debug!(error = %e, "child dequeue rejected"),
            }
        };
        drop(consumer);

        match &reason {
            ExitReason::Disabled => {
                events.send(eid::CHILD_EXIT, EventKind::Info, "Child task exiting");
            }
            ExitReason::Fatal(e) => {
                events.send(
                    eid::CHILD_EXIT,
                    EventKind::Critical,
                    &format!("Child task terminated: {e}"),
                );
            }
        }

        WorkerExit {
            ctx,
            dispatcher,
            reason,
        }
    }

    /// Run the worker on a named thread.
    pub fn spawn(self, name: &str) -> Result<JoinHandle<WorkerExit<C>>, ChildError>
    where
        C: Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.run())
            .map_err(|e| ChildError::Spawn(e.to_string()))?;
        info!(thread = name, "child task spawned");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::ChildQueue;
    use crate::msg::CmdPacket;
    use fsw_common::events::MemorySink;

    #[test]
    fn worker_executes_then_exits_on_shutdown() {
        let sink = MemorySink::new();
        let (mut tx, rx) = ChildQueue::<4>::create(sink.clone());

        let mut disp: CmdDispatcher<Vec<u8>> = CmdDispatcher::new(sink.clone());
        disp.register(3, 1, |seen: &mut Vec<u8>, pkt: &[u8]| {
            seen.push(pkt[8]);
            true
        })
        .unwrap();

        let handle = ChildWorker::new(rx, disp, Vec::new())
            .spawn("child-test")
            .unwrap();

        for tag in [7u8, 8, 9] {
            tx.enqueue(&CmdPacket::build(0x1881, 3, &[tag]).unwrap()).unwrap();
        }
        while tx.queue_count() > 0 || tx.status().valid_count < 3 {
            std::thread::yield_now();
        }
        tx.shutdown();

        let exit = handle.join().unwrap();
        assert_eq!(exit.reason, ExitReason::Disabled);
        assert_eq!(exit.ctx, vec![7, 8, 9]);
        assert_eq!(exit.dispatcher.valid_count(), 3);
        assert!(sink.contains(eid::CHILD_START));
        assert!(sink.contains(eid::CHILD_EXIT));
    }

    #[test]
    fn shutdown_runs_commands_already_queued() {
        let sink = MemorySink::new();
        let (mut tx, rx) = ChildQueue::<4>::create(sink.clone());

        let mut disp: CmdDispatcher<Vec<u8>> = CmdDispatcher::new(sink.clone());
        disp.register(3, 1, |seen: &mut Vec<u8>, pkt: &[u8]| {
            seen.push(pkt[8]);
            true
        })
        .unwrap();

        for tag in 0..3u8 {
            tx.enqueue(&CmdPacket::build(0x1881, 3, &[tag]).unwrap()).unwrap();
        }
        tx.shutdown();

        let exit = ChildWorker::new(rx, disp, Vec::new()).run();
        assert_eq!(exit.reason, ExitReason::Disabled);
        assert_eq!(exit.ctx, vec![0, 1, 2]);
        assert_eq!(tx.queue_count(), 0);
        assert_eq!(tx.status().valid_count, 3);
    }
}
