//! HTTP clients used by the coordination layer
//!
//! The monitor and router only talk to nodes through the [`Prober`] and
//! [`NodeApi`] traits, so tests can substitute scripted fakes for the network.

pub mod node_client;
pub mod prober;
pub mod router_client;

pub use node_client::{HttpNodeClient, NodeApi};
pub use prober::{HttpProber, Prober};
pub use router_client::{RouterClient, SubmitOutcome};
