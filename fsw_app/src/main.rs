//! # Sample App
//!
//! Loads the app configuration, registers and loads its tables, starts the
//! compute child task, then delivers one command packet per stdin line
//! (see [`fsw_app::harness`] for the line format) until end of input.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use fsw_app::harness::{Step, parse_line};
use fsw_app::{AppConfig, AppError, SampleApp};
use fsw_common::consts::DEFAULT_CONFIG_PATH;
use fsw_common::events::tracing_sink;
use fsw_common::prelude::*;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Sample flight-software app
#[derive(Parser, Debug)]
#[command(name = "fsw_app")]
#[command(version)]
#[command(about = "Sample app: command dispatch, tables and a child task")]
struct Args {
    /// Path to the app configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // tracing is not up yet, so a bad config goes to stderr
    let config = match AppConfig::load_from(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };
    setup_tracing(&args, config.shared.log_level);

    info!("Sample app v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&config) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Sample app shutdown complete");
}

fn run(config: &AppConfig) -> Result<(), AppError> {
    info!(
        "Config OK: service={}, cmd_msg_id=0x{:04X}",
        config.shared.service_name, config.app.cmd_msg_id
    );

    let (mut app, child) = SampleApp::start(config, tracing_sink())?;

    let stdin = io::stdin();
    for (i, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        match parse_line(config.app.cmd_msg_id, i + 1, &line) {
            Ok(Some(Step::Packet(pkt))) => {
                let valid = app.deliver(&pkt);
                info!(line = i + 1, valid, "command delivered");
            }
            Ok(Some(Step::Wait(delay))) => std::thread::sleep(delay),
            Ok(Some(Step::Status)) => log_status(&app),
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
    }

    app.shutdown();
    match child.join() {
        Ok(exit) => info!(reason = ?exit.reason, "child task joined"),
        Err(_) => error!("child task panicked"),
    }
    log_status(&app);
    Ok(())
}

fn log_status(app: &SampleApp) {
    match serde_json::to_string(&app.status()) {
        Ok(json) => info!(status = %json, "housekeeping"),
        Err(e) => warn!("status serialization failed: {e}"),
    }
}

fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::from(configured)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
