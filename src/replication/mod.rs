//! Primary-to-replica write propagation
//!
//! Replication is best-effort and unordered relative to other writes: there
//! is no log, no delivery confirmation to the client and no catch-up for a
//! replica that was down when a write was propagated.

pub mod propagator;

pub use propagator::{Propagator, ReplicationJob, ReplicationReport, ReplicationStats};
