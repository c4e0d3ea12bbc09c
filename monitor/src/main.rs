use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blackcnote_monitor::config::Config;
use blackcnote_monitor::error::Result;
use blackcnote_monitor::monitor::Monitor;
use blackcnote_monitor::scheduler::{Scheduler, Task};
use blackcnote_monitor::shutdown;

/// Monitoring daemon for the BlackCnote development stack.
#[derive(Parser, Debug)]
#[command(name = "blackcnote-monitor", version)]
struct Cli {
    /// Run one health check, print the report as JSON and exit.
    #[arg(long, conflicts_with_all = ["status", "daemon"])]
    health: bool,
    /// Run one health check, print a short summary and exit.
    #[arg(long, conflicts_with = "daemon")]
    status: bool,
    /// Run the monitoring loop (the default).
    #[arg(long)]
    daemon: bool,
    /// YAML configuration file. Falls back to MONITOR_CONFIG, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let workloads_enabled = config.workloads_enabled;
    let intervals = config.intervals.clone();
    let mut monitor = Monitor::new(config)?;

    if cli.health {
        let report = monitor.health_check().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if cli.status {
        let report = monitor.health_check().await?;
        println!("{}", report.summary());
        return Ok(());
    }

    let token = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_signal(token.clone()));

    let mut scheduler = Scheduler::new(monitor, &intervals, token);
    if !workloads_enabled {
        info!("workload probing disabled");
        scheduler = scheduler.without(Task::Workloads);
    }
    scheduler.run().await;
    Ok(())
}
