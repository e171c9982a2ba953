//! # tapflow: screen automation runner
//!
//! Composition root that wires the adb adapter into the automation engine
//! and runs one scenario to completion.
//!
//! ## Responsibilities
//! - Parse CLI arguments and environment overrides
//! - Load, validate and path-resolve the scenario file
//! - Connect to the emulator and preload template images
//! - Drain run events into log lines
//! - Cancel the run on Ctrl-C
//! - Map the run outcome to a process exit code
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no automation logic belongs here.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use tapflow_adapter_adb::AdbDevice;
use tapflow_app::controller::AutomationController;
use tapflow_app::event_bus::InProcessRunEventBus;
use tapflow_app::template_store::TemplateStore;
use tapflow_domain::event::RunEvent;
use tapflow_domain::run::RunReport;
use tapflow_domain::scenario::DEFAULT_IMAGE_ROOT;

use crate::config::{DEFAULT_CONFIG_PATH, LoggingConfig};

/// Exit code for failures before the first step runs.
const EXIT_SETUP_ERROR: u8 = 2;
/// Exit code for a run that ended on a failed step.
const EXIT_STEP_FAILED: u8 = 1;

const EVENT_BUS_CAPACITY: usize = 256;

/// Drive an Android emulator through a scripted sequence of screens.
#[derive(Debug, Parser)]
#[command(name = "tapflow", version, about)]
struct Cli {
    /// Scenario file (.json, .yaml, .yml or .toml).
    #[arg(long, env = "TAPFLOW_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory that relative template paths are resolved against.
    #[arg(long, env = "TAPFLOW_IMAGE_ROOT", default_value = DEFAULT_IMAGE_ROOT)]
    image_root: PathBuf,

    /// Skip `adb connect` (for devices that are already attached).
    #[arg(long)]
    no_connect: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&LoggingConfig::from_env());

    match run(cli).await {
        Ok(report) => {
            println!("{report}");
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_STEP_FAILED)
            }
        }
        Err(err) => {
            tracing::error!(error = ?err, "setup failed");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let scenario = config::load_scenario(&cli.config, &cli.image_root)
        .with_context(|| format!("loading scenario {}", cli.config.display()))?;

    let device = AdbDevice::new(&scenario.device);
    if cli.no_connect {
        tracing::info!("skipping adb connect");
    } else {
        device
            .connect()
            .await
            .with_context(|| format!("connecting to {}", scenario.device.connect_addr()))?;
    }

    let templates = Arc::new(TemplateStore::preload(&scenario));

    let bus = Arc::new(InProcessRunEventBus::new(EVENT_BUS_CAPACITY));
    let drain = tokio::spawn(log_events(bus.subscribe()));

    let controller =
        AutomationController::new(Arc::new(scenario), templates, device, Arc::clone(&bus));
    let token = controller.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            token.cancel();
        }
    });

    let report = controller.run().await;

    // Closing the bus lets the drain task finish.
    drop(controller);
    drop(bus);
    if let Err(err) = drain.await {
        tracing::warn!(error = %err, "event drain task failed");
    }
    Ok(report)
}

async fn log_events(mut rx: broadcast::Receiver<RunEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) if event.is_milestone() => {
                tracing::info!(kind = event.kind(), ?event, "run event");
            }
            Ok(event) => tracing::debug!(kind = event.kind(), ?event, "run event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
