//! Sample app: main dispatcher, tables and the compute child task.
//!
//! | fc | command    | payload                   | task  |
//! |----|------------|---------------------------|-------|
//! | 0  | no-op      | none                      | main  |
//! | 1  | reset      | none                      | main  |
//! | 2  | load table | id, load type, filename   | main  |
//! | 3  | dump table | id, spare, filename       | main  |
//! | 4  | compute    | iterations, seed          | child |
//! | 5  | enable     | 0 or 1                    | main  |

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use fsw_common::consts::{CHILD_QUEUE_DEPTH, MAX_FUNCTION_CODES};
use fsw_common::events::{EventKind, SharedSink};
use fsw_core::child::{ChildProducer, ChildQueue, ChildStatus, ChildWorker, WorkerExit};
use fsw_core::cmd::{BindingCounts, CmdDispatcher, bool_str, valid_bool_arg};
use fsw_core::loader::ObjectLoader;
use fsw_core::msg::CmdView;
use fsw_core::table::{DUMP_TBL_CMD_LEN, DumpTblCmd, LOAD_TBL_CMD_LEN, TableRegistry, TableStatus};
use parking_lot::Mutex;
use serde::Serialize;
use static_assertions::const_assert;
use tracing::info;

use crate::compute::{COMPUTE_CMD_LEN, ComputeReport, ComputeState, compute_cmd};
use crate::config::AppConfig;
use crate::eid;
use crate::error::AppError;
use crate::tables::{SampleTables, TableIds, register_tables};

pub const NOOP_CC: u16 = 0;
pub const RESET_CC: u16 = 1;
pub const LOAD_TBL_CC: u16 = 2;
pub const DUMP_TBL_CC: u16 = 3;
pub const COMPUTE_CC: u16 = 4;
pub const ENABLE_CC: u16 = 5;

const_assert!((ENABLE_CC as usize) < MAX_FUNCTION_CODES);

/// State every main-task handler receives.
pub struct AppState {
    pub tables: TableRegistry<SampleTables>,
    pub data: SampleTables,
    pub child: ChildProducer,
    pub enabled: bool,
    dump_dir: PathBuf,
    reset_requested: bool,
    events: SharedSink,
}

/// Housekeeping snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub valid_count: u16,
    pub invalid_count: u16,
    pub compute_cmd: BindingCounts,
    pub enabled: bool,
    pub child: ChildStatus,
    pub compute: ComputeReport,
    pub tables: Vec<TableStatus>,
}

pub struct SampleApp {
    dispatcher: CmdDispatcher<AppState>,
    state: AppState,
    table_ids: TableIds,
    compute: Arc<Mutex<ComputeReport>>,
}

impl SampleApp {
    /// Build the app and its (not yet running) child worker.
    pub fn new(config: &AppConfig, events: SharedSink) -> Result<(Self, ChildWorker<ComputeState>), AppError> {
        let (producer, consumer) = ChildQueue::<CHILD_QUEUE_DEPTH>::create(events.clone());

        let mut child_dispatcher = CmdDispatcher::new(events.clone());
        child_dispatcher.register(COMPUTE_CC, COMPUTE_CMD_LEN, compute_cmd)?;
        let compute_state = ComputeState::new(config.child.pause_budget(), events.clone());
        let compute = compute_state.report_handle();
        let worker = ChildWorker::new(consumer, child_dispatcher, compute_state);

        let loader = ObjectLoader::new(events.clone());
        let mut tables = TableRegistry::new(events.clone());
        let mut data = SampleTables::default();
        let table_ids = register_tables(&mut tables, &mut data, &loader, &config.app)?;

        let mut dispatcher = CmdDispatcher::new(events.clone());
        dispatcher.register(NOOP_CC, 0, noop_cmd)?;
        dispatcher.register(RESET_CC, 0, |s: &mut AppState, _: &[u8]| {
            s.reset_requested = true;
            true
        })?;
        dispatcher.register(LOAD_TBL_CC, LOAD_TBL_CMD_LEN, |s: &mut AppState, buf: &[u8]| {
            s.tables.load_cmd(&mut s.data, buf)
        })?;
        dispatcher.register(DUMP_TBL_CC, DUMP_TBL_CMD_LEN, dump_tbl_cmd)?;
        dispatcher.register_private(COMPUTE_CC, COMPUTE_CMD_LEN, forward_compute_cmd)?;
        dispatcher.register(ENABLE_CC, 1, enable_cmd)?;

        events.send(
            eid::APP_INIT,
            EventKind::Info,
            &format!(
                "{} initialized, version {}",
                config.shared.service_name,
                env!("CARGO_PKG_VERSION")
            ),
        );

        let app = Self {
            dispatcher,
            state: AppState {
                tables,
                data,
                child: producer,
                enabled: true,
                dump_dir: config.app.dump_dir.clone(),
                reset_requested: false,
                events,
            },
            table_ids,
            compute,
        };
        Ok((app, worker))
    }

    /// Build the app and start its child task.
    pub fn start(
        config: &AppConfig,
        events: SharedSink,
    ) -> Result<(Self, JoinHandle<WorkerExit<ComputeState>>), AppError> {
        let (app, worker) = Self::new(config, events)?;
        let handle = worker.spawn("sample-child")?;
        Ok((app, handle))
    }

    /// Dispatch one command packet.
    pub fn deliver(&mut self, buf: &[u8]) -> bool {
        let valid = self.dispatcher.dispatch(&mut self.state, buf);
        if std::mem::take(&mut self.state.reset_requested) {
            self.reset_counters();
        }
        valid
    }

    fn reset_counters(&mut self) {
        self.dispatcher.reset_status();
        self.state.tables.reset_status();
        self.state.child.reset_status();
        self.state
            .events
            .send(eid::APP_RESET, EventKind::Debug, "Reset counters command");
    }

    pub fn status(&self) -> AppStatus {
        let tables = [self.table_ids.limits, self.table_ids.params]
            .into_iter()
            .filter_map(|id| self.state.tables.get_status(id))
            .collect();
        AppStatus {
            valid_count: self.dispatcher.valid_count(),
            invalid_count: self.dispatcher.invalid_count(),
            compute_cmd: self
                .dispatcher
                .binding_counts(COMPUTE_CC)
                .unwrap_or_default(),
            enabled: self.state.enabled,
            child: self.state.child.status(),
            compute: *self.compute.lock(),
            tables,
        }
    }

    pub fn tables(&self) -> &SampleTables {
        &self.state.data
    }

    pub const fn table_ids(&self) -> TableIds {
        self.table_ids
    }

    /// Stop the child task. Join its handle afterwards.
    pub fn shutdown(&self) {
        info!("stopping child task");
        self.state.child.shutdown();
    }
}

fn noop_cmd(s: &mut AppState, _buf: &[u8]) -> bool {
    s.events.send(
        eid::APP_NOOP,
        EventKind::Info,
        &format!("No-op command, version {}", env!("CARGO_PKG_VERSION")),
    );
    true
}

/// Relative dump filenames land in the configured dump directory.
fn dump_tbl_cmd(s: &mut AppState, buf: &[u8]) -> bool {
    let decoded = CmdView::parse(buf)
        .ok()
        .and_then(|view| DumpTblCmd::decode(view.payload()).ok());
    match decoded {
        Some(cmd) => {
            let path = s.dump_dir.join(&cmd.filename);
            s.tables.dump_command(&s.data, cmd.id, &path)
        }
        // let the registry report the malformed command
        None => s.tables.dump_cmd(&s.data, buf),
    }
}

fn forward_compute_cmd(s: &mut AppState, buf: &[u8]) -> bool {
    if !s.enabled {
        s.events.send(
            eid::COMPUTE_ERR,
            EventKind::Error,
            "Compute rejected: processing disabled",
        );
        return false;
    }
    s.child.invoke_child_cmd(buf)
}

fn enable_cmd(s: &mut AppState, buf: &[u8]) -> bool {
    let Some(enabled) = buf.get(8).and_then(|&arg| valid_bool_arg(&s.events, arg)) else {
        return false;
    };
    s.enabled = enabled;
    s.events.send(
        eid::APP_ENABLE,
        EventKind::Info,
        &format!("Processing enabled set to {}", bool_str(enabled)),
    );
    true
}
