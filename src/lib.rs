//! # custody
//!
//! Primary-backup coordination for a chain-of-custody shipment ledger:
//! - Health monitor with threshold-based failover to the next node in a ring
//! - Versioned primary pointer shared by the monitor and the router
//! - Routing layer that forwards writes to the live primary or rejects them
//! - Ledger nodes that replicate client writes to every peer
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!   client ──HTTP──▶ ┌────────────────┐  reads   ┌──────────────────┐
//!                    │ Routing layer  │ ───────▶ │ Primary pointer  │
//!                    └───────┬────────┘          │ (node, epoch)    │
//!                            │ probe + forward   └────────▲─────────┘
//!                            ▼                            │ publishes
//!   ┌────────────┐    ┌────────────┐    ┌────────────┐  ┌─┴──────────────┐
//!   │ Factory    │───▶│ Distributor│    │ Pharmacy   │  │ Health monitor │
//!   │ (primary)  │───────────────────▶  │            │  │ probes primary │
//!   └────────────┘    └────────────┘    └────────────┘  └────────────────┘
//!        replication to every other node
//! ```
//!
//! ## Usage
//!
//! ### Start the nodes
//! ```bash
//! custody-node serve --name Factory --bind 127.0.0.1:50051 --health-bind 127.0.0.1:8001
//! custody-node serve --name Distributor --bind 127.0.0.1:50052 --health-bind 127.0.0.1:8002
//! custody-node serve --name Pharmacy --bind 127.0.0.1:50053 --health-bind 127.0.0.1:8003
//! ```
//!
//! ### Start the monitor and the router
//! ```bash
//! custody-monitor run --interval 3s --threshold 3
//! custody-router serve --bind 127.0.0.1:8080
//! ```
//!
//! ### Use the CLI
//! ```bash
//! custody submit MED1001 --sender Factory --receiver Distributor --status Shipped
//! custody ledger --node Distributor
//! custody primary
//! custody verify
//! custody demo
//! ```

pub mod client;
pub mod common;
pub mod monitor;
pub mod node;
pub mod ops;
pub mod pointer;
pub mod replication;
pub mod router;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use monitor::HealthMonitor;
pub use node::LedgerNode;
pub use pointer::PrimaryPointer;
pub use router::{RoutingServer, WriteRouter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
