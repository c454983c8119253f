//! Compute command, executed in the child task.
//!
//! Payload: `[iterations: u32 BE][seed: u32 BE]`. The worker runs a
//! mixing loop for `iterations` rounds, yielding through its
//! [`PauseBudget`], and publishes the result in a shared [`ComputeReport`].

use std::sync::Arc;

use fsw_common::events::{EventKind, SharedSink};
use fsw_core::child::PauseBudget;
use fsw_core::msg::CmdView;
use parking_lot::Mutex;
use serde::Serialize;

use crate::eid;

/// Payload length of the compute command.
pub const COMPUTE_CMD_LEN: usize = 8;

/// Upper bound on rounds per command.
pub const MAX_ITERATIONS: u32 = 10_000_000;

const MIX_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// Decoded compute command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeCmd {
    pub iterations: u32,
    pub seed: u32,
}

impl ComputeCmd {
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let iterations = payload.get(0..4)?.try_into().ok().map(u32::from_be_bytes)?;
        let seed = payload.get(4..8)?.try_into().ok().map(u32::from_be_bytes)?;
        Some(Self { iterations, seed })
    }

    pub fn encode(&self) -> [u8; COMPUTE_CMD_LEN] {
        let mut out = [0u8; COMPUTE_CMD_LEN];
        out[..4].copy_from_slice(&self.iterations.to_be_bytes());
        out[4..].copy_from_slice(&self.seed.to_be_bytes());
        out
    }
}

/// Results published by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComputeReport {
    pub runs: u32,
    pub last_iterations: u32,
    pub last_result: u64,
    pub pauses: u32,
}

/// Child-task context.
pub struct ComputeState {
    budget: PauseBudget,
    report: Arc<Mutex<ComputeReport>>,
    events: SharedSink,
}

impl ComputeState {
    pub fn new(budget: PauseBudget, events: SharedSink) -> Self {
        Self {
            budget,
            report: Arc::new(Mutex::new(ComputeReport::default())),
            events,
        }
    }

    /// Handle the main task keeps to read results.
    pub fn report_handle(&self) -> Arc<Mutex<ComputeReport>> {
        Arc::clone(&self.report)
    }

    pub fn report(&self) -> ComputeReport {
        *self.report.lock()
    }
}

/// Mixing loop. Deterministic for a given command.
pub fn mix(cmd: ComputeCmd, mut on_round: impl FnMut()) -> u64 {
    let mut acc = u64::from(cmd.seed);
    for round in 0..cmd.iterations {
        acc = acc
            .wrapping_mul(MIX_MULTIPLIER)
            .wrapping_add(u64::from(round) | 1);
        on_round();
    }
    acc
}

/// Child dispatcher handler for the compute command.
pub fn compute_cmd(state: &mut ComputeState, buf: &[u8]) -> bool {
    let Some(cmd) = CmdView::parse(buf)
        .ok()
        .and_then(|view| ComputeCmd::decode(view.payload()))
    else {
        return false;
    };
    if cmd.iterations == 0 || cmd.iterations > MAX_ITERATIONS {
        state.events.send(
            eid::COMPUTE_ERR,
            EventKind::Error,
            &format!(
                "Compute rejected: {} iterations outside 1..={MAX_ITERATIONS}",
                cmd.iterations
            ),
        );
        return false;
    }

    state.budget.reset();
    let budget = &mut state.budget;
    let mut pauses = 0u32;
    let result = mix(cmd, || {
        if budget.tick() {
            pauses += 1;
        }
    });

    {
        let mut report = state.report.lock();
        report.runs = report.runs.wrapping_add(1);
        report.last_iterations = cmd.iterations;
        report.last_result = result;
        report.pauses = pauses;
    }
    state.events.send(
        eid::COMPUTE_DONE,
        EventKind::Info,
        &format!(
            "Compute finished: {} iterations, result 0x{result:016X}",
            cmd.iterations
        ),
    );
    true
}
