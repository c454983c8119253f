//! Sample app end-to-end tests: config on disk, tables, main and child tasks.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fsw_app::app::{COMPUTE_CC, DUMP_TBL_CC, ENABLE_CC, LOAD_TBL_CC, NOOP_CC, RESET_CC};
use fsw_app::compute::{ComputeCmd, ComputeState, mix};
use fsw_app::harness::{Step, parse_script};
use fsw_app::{AppConfig, SampleApp, eid as app_eid};
use fsw_common::events::{MemorySink, eid};
use fsw_core::child::{ExitReason, WorkerExit};
use fsw_core::msg::CmdPacket;
use fsw_core::table::{ActionStatus, DumpTblCmd, LoadTblCmd, LoadType, TableAction};
use tempfile::TempDir;

const MID: u16 = 0x1880;

fn write_fixture(dir: &Path) -> AppConfig {
    fs::create_dir_all(dir.join("tables")).unwrap();
    fs::create_dir_all(dir.join("dumps")).unwrap();
    fs::write(
        dir.join("tables/limits.json"),
        r#"{ "bin": [ { "lo-lim": 0, "hi-lim": 9 }, { "lo-lim": 10, "hi-lim": 99 } ] }"#,
    )
    .unwrap();
    fs::write(
        dir.join("tables/params.json"),
        r#"{ "params": { "name": "fixture", "scale": 2.0, "threshold": 40 } }"#,
    )
    .unwrap();
    fs::write(
        dir.join("app.toml"),
        r#"
[shared]
service_name = "sample-test"

[app]
limits_table = "tables/limits.json"
params_table = "tables/params.json"
dump_dir = "dumps"

[child]
block_limit = 100
block_delay_ms = 0
"#,
    )
    .unwrap();
    AppConfig::load_from(&dir.join("app.toml")).unwrap()
}

fn pkt(fc: u16, payload: &[u8]) -> Vec<u8> {
    CmdPacket::build(MID, fc, payload).unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

type ChildHandle = thread::JoinHandle<WorkerExit<ComputeState>>;

fn start() -> (TempDir, SampleApp, ChildHandle, Arc<MemorySink>) {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path());
    let sink = MemorySink::new();
    let (app, handle) = SampleApp::start(&config, sink.clone()).unwrap();
    (dir, app, handle, sink)
}

#[test]
fn test_startup_loads_default_tables() {
    let (_dir, app, handle, sink) = start();

    assert_eq!(app.tables().limits.bins.len(), 2);
    assert_eq!(app.tables().limits.classify(5), Some(0));
    assert_eq!(app.tables().params.name, "fixture");
    assert_eq!(app.tables().params.threshold, 40);
    assert!(sink.contains(app_eid::APP_INIT));
    assert_eq!(sink.count(eid::TBL_LOAD), 2);

    let status = app.status();
    assert_eq!(status.tables.len(), 2);
    assert!(status.tables.iter().all(|t| t.loaded));
    assert!(status.child.enabled);

    app.shutdown();
    assert!(matches!(handle.join().unwrap().reason, ExitReason::Disabled));
}

#[test]
fn test_noop_and_enable_commands() {
    let (_dir, mut app, handle, sink) = start();

    assert!(app.deliver(&pkt(NOOP_CC, &[])));
    assert!(sink.contains(app_eid::APP_NOOP));

    assert!(app.deliver(&pkt(ENABLE_CC, &[0])));
    assert!(!app.status().enabled);
    assert!(app.deliver(&pkt(ENABLE_CC, &[1])));
    assert!(app.status().enabled);

    assert!(!app.deliver(&pkt(ENABLE_CC, &[2])));
    assert!(sink.contains(eid::CMD_INVALID_BOOL));
    assert!(app.status().enabled);

    // wrong payload length for no-op
    assert!(!app.deliver(&pkt(NOOP_CC, &[0, 0])));
    assert!(sink.contains(eid::CMD_INVALID_LENGTH));

    let status = app.status();
    assert_eq!(status.valid_count, 3);
    assert_eq!(status.invalid_count, 2);

    app.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_compute_runs_in_child_task() {
    let (_dir, mut app, handle, sink) = start();
    let cmd = ComputeCmd {
        iterations: 250,
        seed: 42,
    };

    assert!(app.deliver(&pkt(COMPUTE_CC, &cmd.encode())));
    assert!(wait_until(|| app.status().child.valid_count == 1));

    let status = app.status();
    // forwarded commands are counted privately, not in the main counters
    assert_eq!(status.valid_count, 0);
    assert_eq!(status.compute_cmd.valid, 1);
    assert_eq!(status.child.curr_fc, Some(COMPUTE_CC));
    assert_eq!(status.compute.runs, 1);
    assert_eq!(status.compute.last_result, mix(cmd, || {}));
    assert_eq!(status.compute.pauses, 2);
    assert!(sink.contains(app_eid::COMPUTE_DONE));

    // accepted by the main task, rejected by the child
    let zero = ComputeCmd {
        iterations: 0,
        seed: 1,
    };
    assert!(app.deliver(&pkt(COMPUTE_CC, &zero.encode())));
    assert!(wait_until(|| app.status().child.invalid_count == 1));
    assert!(sink.contains(app_eid::COMPUTE_ERR));

    app.shutdown();
    let exit = handle.join().unwrap();
    assert_eq!(exit.ctx.report().runs, 1);
}

#[test]
fn test_compute_rejected_while_disabled() {
    let (_dir, mut app, handle, sink) = start();
    let cmd = ComputeCmd {
        iterations: 10,
        seed: 3,
    };

    assert!(app.deliver(&pkt(ENABLE_CC, &[0])));
    assert!(!app.deliver(&pkt(COMPUTE_CC, &cmd.encode())));
    assert!(sink.contains(app_eid::COMPUTE_ERR));

    let status = app.status();
    assert_eq!(status.compute_cmd.invalid, 1);
    assert_eq!(status.child.queue_count, 0);
    assert_eq!(status.compute.runs, 0);

    app.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_compute_after_shutdown_rejected() {
    let (_dir, mut app, handle, sink) = start();
    app.shutdown();
    handle.join().unwrap();

    let cmd = ComputeCmd {
        iterations: 10,
        seed: 3,
    };
    assert!(!app.deliver(&pkt(COMPUTE_CC, &cmd.encode())));
    assert!(sink.contains(eid::CHILD_DISABLED));
    assert!(!app.status().child.enabled);
}

#[test]
fn test_dump_then_load_params() {
    let (dir, mut app, handle, sink) = start();
    let ids = app.table_ids();

    let dump = DumpTblCmd {
        id: ids.params,
        filename: "params_dump.json".into(),
    };
    assert!(app.deliver(&pkt(DUMP_TBL_CC, &dump.encode().unwrap())));
    let dumped = dir.path().join("dumps/params_dump.json");
    assert!(dumped.exists());
    assert!(sink.contains(eid::TBL_DUMP));

    // partial update: threshold only
    let partial = dir.path().join("partial.json");
    fs::write(&partial, r#"{ "params": { "threshold": 77 } }"#).unwrap();
    let load = LoadTblCmd {
        id: ids.params,
        load_type: LoadType::Update,
        filename: partial.display().to_string(),
    };
    assert!(app.deliver(&pkt(LOAD_TBL_CC, &load.encode().unwrap())));
    assert_eq!(app.tables().params.threshold, 77);
    assert_eq!(app.tables().params.name, "fixture");

    // loading the dump restores the first threshold
    let restore = LoadTblCmd {
        id: ids.params,
        load_type: LoadType::Replace,
        filename: dumped.display().to_string(),
    };
    assert!(app.deliver(&pkt(LOAD_TBL_CC, &restore.encode().unwrap())));
    assert_eq!(app.tables().params.threshold, 40);
    assert_eq!(app.tables().params.scale, 2.0);

    let status = app.status();
    let params = status.tables.iter().find(|t| t.id == ids.params).unwrap();
    assert_eq!(params.last_action, TableAction::Load);
    assert_eq!(params.last_action_status, ActionStatus::Valid);
    assert_eq!(params.filename, dumped.display().to_string());

    app.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_bad_limits_load_keeps_live_table() {
    let (dir, mut app, handle, sink) = start();
    let ids = app.table_ids();

    let bad = dir.path().join("bad_limits.json");
    fs::write(&bad, r#"{ "bin": [ { "lo-lim": 50, "hi-lim": 10 } ] }"#).unwrap();
    let load = LoadTblCmd {
        id: ids.limits,
        load_type: LoadType::Replace,
        filename: bad.display().to_string(),
    };

    assert!(!app.deliver(&pkt(LOAD_TBL_CC, &load.encode().unwrap())));
    assert!(sink.contains(eid::TBL_LOAD_ERR));
    assert_eq!(app.tables().limits.bins.len(), 2);
    let status = app.status();
    let limits = status.tables.iter().find(|t| t.id == ids.limits).unwrap();
    assert!(limits.loaded);
    assert_eq!(limits.last_action_status, ActionStatus::Invalid);

    app.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_reset_clears_counters() {
    let (_dir, mut app, handle, sink) = start();
    let cmd = ComputeCmd {
        iterations: 5,
        seed: 1,
    };

    assert!(app.deliver(&pkt(NOOP_CC, &[])));
    assert!(!app.deliver(&pkt(31, &[])));
    assert!(app.deliver(&pkt(COMPUTE_CC, &cmd.encode())));
    assert!(wait_until(|| app.status().child.valid_count == 1));

    assert!(app.deliver(&pkt(RESET_CC, &[])));
    assert!(sink.contains(app_eid::APP_RESET));

    let status = app.status();
    assert_eq!(status.valid_count, 0);
    assert_eq!(status.invalid_count, 0);
    assert_eq!(status.compute_cmd.valid, 0);
    assert_eq!(status.child.valid_count, 0);
    assert!(status.tables.iter().all(|t| t.loaded));

    app.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_script_drives_app() {
    let (_dir, mut app, handle, _sink) = start();
    let script = "\
0
5 00
compute 10 1      # rejected while disabled
5 01
compute 10 1
status
";
    let steps = parse_script(MID, script).unwrap();
    assert_eq!(steps.len(), 6);

    let verdicts: Vec<bool> = steps
        .iter()
        .filter_map(|step| match step {
            Step::Packet(p) => Some(app.deliver(p)),
            _ => None,
        })
        .collect();
    assert_eq!(verdicts, vec![true, true, false, true, true]);
    assert!(wait_until(|| app.status().compute.runs == 1));

    app.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_status_serializes_to_json() {
    let (_dir, app, handle, _sink) = start();
    let json = serde_json::to_value(app.status()).unwrap();
    assert_eq!(json["enabled"], true);
    assert_eq!(json["child"]["depth"], 8);
    assert_eq!(json["tables"][0]["name"], "SAMPLE.Limits");
    app.shutdown();
    handle.join().unwrap();
}
