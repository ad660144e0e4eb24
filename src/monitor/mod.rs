//! Health monitor and failover
//!
//! The monitor is the only writer of the primary pointer. It probes the
//! current primary on a fixed cadence and, after `failure_threshold`
//! consecutive misses, promotes the node its policy picks.
//!
//! This is liveness-only failover: there is no quorum and no split-brain
//! detection. If the monitor is partitioned from a healthy primary it will
//! still promote the next node.

pub mod health;
pub mod policy;
pub mod tracker;

pub use health::{HealthMonitor, MonitorStats, TickOutcome};
pub use policy::{FailoverState, PromotionPolicy, RoundRobin};
pub use tracker::FailureTracker;
