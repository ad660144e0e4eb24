//! Ledger node binary

use clap::{Parser, Subcommand};
use custody::common::{shutdown_on_ctrl_c, Config, ConsistencyMode};
use custody::LedgerNode;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "custody-node")]
#[command(about = "custody ledger node")]
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
    /// Start a ledger node
    Serve {
        /// Node name; must be a member of the cluster ring
        #[arg(long)]
        name: Option<String>,

        /// Bind address for the write/read API
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Bind address for the health endpoint
        #[arg(long)]
        health_bind: Option<SocketAddr>,

        /// eventual or strong
        #[arg(long)]
        consistency: Option<ConsistencyMode>,

        /// sled directory (requires the sled-backend feature)
        #[arg(long)]
        data: Option<PathBuf>,
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
            name,
            bind,
            health_bind,
            consistency,
            data,
        } => {
            // CLI flags take priority over the config file
            if let Some(name) = name {
                config.node.name = name;
            }
            if let Some(bind) = bind {
                config.node.bind_addr = bind;
            }
            if let Some(health_bind) = health_bind {
                config.node.health_addr = health_bind;
            }
            if let Some(consistency) = consistency {
                config.node.consistency = consistency;
            }
            if data.is_some() {
                config.node.data_path = data;
            }

            let ring = config.cluster.ring()?;
            let node = LedgerNode::new(config.node, ring, config.replication)?;
            node.serve(shutdown_on_ctrl_c()).await?;
        }
    }

    Ok(())
}
