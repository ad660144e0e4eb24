//! Health monitor binary

use clap::{Parser, Subcommand};
use custody::client::HttpProber;
use custody::common::{parse_duration, shutdown_on_ctrl_c, Config};
use custody::{HealthMonitor, PrimaryPointer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "custody-monitor")]
#[command(about = "custody health monitor and failover")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./custody.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the primary and fail over when it stops answering
    Run {
        /// Heartbeat interval (e.g. 3s)
        #[arg(long)]
        interval: Option<String>,

        /// Probe timeout (e.g. 2s)
        #[arg(long)]
        timeout: Option<String>,

        /// Consecutive failures before failover
        #[arg(long)]
        threshold: Option<u32>,

        /// Primary pointer file
        #[arg(long)]
        pointer: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run {
            interval,
            timeout,
            threshold,
            pointer,
        } => {
            if let Some(interval) = interval {
                config.monitor.interval_ms = parse_duration(&interval)?.as_millis() as u64;
            }
            if let Some(timeout) = timeout {
                config.monitor.probe_timeout_ms = parse_duration(&timeout)?.as_millis() as u64;
            }
            if let Some(threshold) = threshold {
                config.monitor.failure_threshold = threshold;
            }
            if let Some(pointer) = pointer {
                config.pointer_path = pointer;
            }
            config.validate()?;

            tracing::info!("Starting health monitor");
            tracing::info!("  Pointer: {}", config.pointer_path.display());
            tracing::info!("  Interval: {:?}", config.monitor.interval());
            tracing::info!("  Probe timeout: {:?}", config.monitor.probe_timeout());

            let ring = config.cluster.ring()?;
            let prober = Arc::new(HttpProber::new(config.monitor.probe_timeout())?);
            let pointer = PrimaryPointer::file(&config.pointer_path);
            let monitor = HealthMonitor::new(ring, pointer, prober, config.monitor);
            let stats = monitor.stats();

            monitor.run(shutdown_on_ctrl_c()).await;

            tracing::info!(
                probes_ok = stats.probes_ok.get(),
                probes_failed = stats.probes_failed.get(),
                failovers = stats.failovers.get(),
                "Monitor summary"
            );
        }
    }

    Ok(())
}
