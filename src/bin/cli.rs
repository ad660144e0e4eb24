//! CLI for submitting custody transactions and inspecting the cluster

use clap::{Parser, Subcommand};
use custody::client::{HttpNodeClient, NodeApi, RouterClient, SubmitOutcome};
use custody::common::{Config, TransactionRecord};
use custody::ops::verify_cluster;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "custody")]
#[command(about = "custody shipment ledger CLI")]
#[command(version)]
struct Cli {
    /// Router URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    router: String,

    /// Config file with the cluster ring (defaults to ./custody.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a custody transaction through the router
    Submit {
        /// Shipment batch id
        batch_id: String,

        #[arg(long)]
        sender: String,

        #[arg(long)]
        receiver: String,

        #[arg(long)]
        status: String,
    },

    /// Print one node's ledger
    Ledger {
        /// Node name
        #[arg(long)]
        node: String,
    },

    /// Show the current primary as seen by the router
    Primary,

    /// Compare ledgers across all nodes
    Verify,

    /// Submit the MED1001 chain: Factory -> Distributor -> Pharmacy -> Patient
    Demo {
        /// Pause between hops in milliseconds
        #[arg(long, default_value = "1000")]
        pause_ms: u64,
    },
}

fn print_outcome(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Accepted(ok) => {
            println!("✓ {} (node: {}, epoch: {})", ok.message, ok.node_used, ok.epoch)
        }
        SubmitOutcome::Unavailable(rejected) => {
            println!("✗ {} (node: {})", rejected.error, rejected.node_used)
        }
        SubmitOutcome::Failed(rejected) => {
            println!("✗ Write failed: {} (node: {})", rejected.error, rejected.node_used)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Submit {
            batch_id,
            sender,
            receiver,
            status,
        } => {
            let client = RouterClient::new(&cli.router, timeout)?;
            let record = TransactionRecord::new(batch_id, sender, receiver, status);
            let outcome = client.submit(&record).await?;
            print_outcome(&outcome);
            if !matches!(outcome, SubmitOutcome::Accepted(_)) {
                std::process::exit(1);
            }
        }

        Commands::Ledger { node } => {
            let config = Config::load(cli.config.as_deref())?;
            let ring = config.cluster.ring()?;
            let descriptor = ring
                .find(&node)
                .ok_or_else(|| anyhow::anyhow!("unknown node: {}", node))?;
            let data = HttpNodeClient::new(timeout)?.ledger(descriptor).await?;

            println!("Ledger of {} ({} entries):", data.node, data.entries.len());
            for entry in &data.entries {
                println!("  {}", entry);
            }
        }

        Commands::Primary => {
            let status = RouterClient::new(&cli.router, timeout)?.status().await?;
            println!("Primary: {}", status["primary"].as_str().unwrap_or("?"));
            println!("  Epoch: {}", status["epoch"]);
            println!("  Alive: {}", status["alive"]);
        }

        Commands::Verify => {
            let config = Config::load(cli.config.as_deref())?;
            let ring = config.cluster.ring()?;
            let api = HttpNodeClient::new(timeout)?;
            let report = verify_cluster(&ring, &api).await;

            println!("Verification report:");
            for node in &report.nodes {
                println!(
                    "  {}: {} records, {} missing",
                    node.node,
                    node.records,
                    node.missing.len()
                );
                for record in &node.missing {
                    println!("    - {}", record);
                }
            }
            for (node, error) in &report.unreachable {
                println!("  {}: unreachable ({})", node, error);
            }
            if !report.is_converged() {
                std::process::exit(1);
            }
        }

        Commands::Demo { pause_ms } => {
            let client = RouterClient::new(&cli.router, timeout)?;
            let chain = [
                TransactionRecord::new("MED1001", "Factory", "Distributor", "Shipped"),
                TransactionRecord::new("MED1001", "Distributor", "Pharmacy", "Delivered"),
                TransactionRecord::new("MED1001", "Pharmacy", "Patient", "Sold"),
            ];

            for (i, record) in chain.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(Duration::from_millis(pause_ms)).await;
                }
                println!("Submitting {}", record);
                match client.submit(record).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => println!("✗ Router unreachable: {}", e),
                }
            }
        }
    }

    Ok(())
}
