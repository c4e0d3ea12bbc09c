/* neira:meta
id: NEI-20261016-151500-exporter-port
intent: bugfix
summary: --serve without a port uses exporter.port from config or environment.
*/
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use blackcnote_monitor::config::Config;
use blackcnote_monitor::error::Result;
use blackcnote_monitor::http::ExpositionServer;
use blackcnote_monitor::metrics_export::MetricsAggregator;
use blackcnote_monitor::shutdown;

/// Derives metrics from the structured debug log.
#[derive(Parser, Debug)]
#[command(name = "metrics-exporter", version)]
struct Cli {
    /// Serve metrics over HTTP instead of printing one export pass. Without a
    /// PORT the configured exporter port is used (9091 by default).
    #[arg(long, value_name = "PORT", num_args = 0..=1)]
    serve: Option<Option<u16>>,
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
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let metrics = MetricsAggregator::new(&config.paths.debug_log);

    let Some(requested) = cli.serve else {
        let set = metrics.export()?;
        print!("{}", set.render(Utc::now()));
        return Ok(());
    };

    let token = CancellationToken::new();
    let port = config.exporter.serve_port(requested);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = ExpositionServer::bind(addr, metrics, &config.exporter, token.clone())
        .await?
        .with_health_report(&config.paths.health_report);

    tokio::spawn(shutdown::cancel_on_signal(token));
    server.serve().await;
    Ok(())
}
