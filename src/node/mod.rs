//! Ledger node
//!
//! A node appends every transaction it receives and serves its whole ledger
//! back. Nodes do not coordinate with each other; the only cross-node traffic
//! is the replication pushed by whichever node receives routed client writes.

pub mod http;
pub mod server;
pub mod store;

pub use server::LedgerNode;
pub use store::{Ledger, LedgerStore, MemLedger};
