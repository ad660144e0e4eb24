//! Routing layer binary

use clap::{Parser, Subcommand};
use custody::common::{shutdown_on_ctrl_c, Config};
use custody::{PrimaryPointer, RoutingServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "custody-router")]
#[command(about = "custody write router")]
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
    /// Serve the client-facing HTTP API
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Primary pointer file
        #[arg(long)]
        pointer: Option<PathBuf>,

        /// Disable the periodic primary watch log
        #[arg(long)]
        no_watch: bool,
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
        Commands::Serve {
            bind,
            pointer,
            no_watch,
        } => {
            if let Some(bind) = bind {
                config.router.bind_addr = bind;
            }
            if let Some(pointer) = pointer {
                config.pointer_path = pointer;
            }
            if no_watch {
                config.router.watch_interval_ms = 0;
            }

            let ring = config.cluster.ring()?;
            let pointer = PrimaryPointer::file(&config.pointer_path);
            let server = RoutingServer::new(config.router, ring, pointer)?;
            server.serve(shutdown_on_ctrl_c()).await?;
        }
    }

    Ok(())
}
