pub mod config;
pub mod externals;
pub mod models;
pub mod ports;
pub mod tasks;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use config::Config;
use externals::{device::SessionMode, telemetry_logging::task::task_telemetry_logging};
use tasks::lifecycle::task_supervise_sampling;
use tokio::{signal, sync::broadcast};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::level_filters::LevelFilter;

/// Sample ADAM-6024 analog inputs and publish calibrated pressure and
/// temperature telemetry.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read from the in-process simulator instead of the controller.
    #[arg(long)]
    simulate: bool,

    /// Maximum log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(args.log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let mode = SessionMode::from(args.simulate);
    tracing::info!(
        "Polling {} every {} ms ({} mode).",
        config.endpoint(),
        config.heartbeat_interval_ms,
        mode
    );

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let (tx_telemetry, rx_telemetry) = broadcast::channel(32);

    let token_clone = token.clone();
    tracker.spawn(async { task_telemetry_logging(token_clone, rx_telemetry).await });

    let token_clone = token.clone();
    let supervisor = tracker.spawn(async move {
        let result = task_supervise_sampling(token_clone.clone(), config, mode, tx_telemetry).await;
        // NOTE: Nothing useful runs without sampling, so bring everything down.
        token_clone.cancel();
        result
    });

    let token_clone = token.clone();
    tokio::select! {
        _ = token_clone.cancelled() => {}
        res = signal::ctrl_c() => {
            match res {
                Ok(_) => {
                    token.cancel();
                },
                Err(e) => {
                    tracing::error!("Failed to listen for ctrl_c. Error: {}", e);
                    token.cancel();
                }
            };
        },
    }

    tracker.close();
    tracker.wait().await;

    supervisor.await??;
    Ok(())
}
