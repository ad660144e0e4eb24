//! Routing layer
//!
//! The client-facing entry point for writes. It holds no state of its own
//! beyond counters: each request reads the primary pointer, checks the
//! primary is alive and forwards the write.

pub mod http;
pub mod route;
pub mod server;

pub use route::{PrimaryView, RouterMetrics, WriteRouter};
pub use server::{spawn_primary_watch, RoutingServer};
