//! Ops commands for cluster management

pub mod verify;

pub use verify::{verify_cluster, NodeReport, VerifyReport};
