//! Configuration for custody components
//!
//! Values come from (lowest to highest priority): built-in defaults, an
//! optional TOML file, `CUSTODY__*` environment variables, then CLI flags
//! applied by each binary.

use crate::common::ring::{NodeDescriptor, NodeRing};
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fixed node membership
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Health monitor settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Routing layer settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Ledger node settings (used by `custody-node`)
    #[serde(default)]
    pub node: NodeConfig,

    /// Replication propagator settings
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Where the primary pointer is published
    #[serde(default = "default_pointer_path")]
    pub pointer_path: PathBuf,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_pointer_path() -> PathBuf {
    PathBuf::from("active_primary.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            monitor: MonitorConfig::default(),
            router: RouterConfig::default(),
            node: NodeConfig::default(),
            replication: ReplicationConfig::default(),
            pointer_path: default_pointer_path(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `./custody.toml` if present) and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(p) => builder.add_source(config::File::from(p)),
            None => builder.add_source(config::File::with_name("custody").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("CUSTODY")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the coordination loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.cluster.ring()?;

        if self.monitor.failure_threshold == 0 {
            return Err(Error::InvalidConfig(
                "monitor.failure_threshold must be at least 1".into(),
            ));
        }
        if self.monitor.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "monitor.interval_ms must be positive".into(),
            ));
        }
        if self.replication.max_attempts == 0 || self.replication.workers == 0 {
            return Err(Error::InvalidConfig(
                "replication.max_attempts and replication.workers must be at least 1".into(),
            ));
        }
        if self.node.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "node.max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Cluster membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Ordered node ring; the first node is the initial primary
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeDescriptor>,
}

fn default_nodes() -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::new(
            "Factory",
            "http://127.0.0.1:50051",
            "http://127.0.0.1:8001/health",
        ),
        NodeDescriptor::new(
            "Distributor",
            "http://127.0.0.1:50052",
            "http://127.0.0.1:8002/health",
        ),
        NodeDescriptor::new(
            "Pharmacy",
            "http://127.0.0.1:50053",
            "http://127.0.0.1:8003/health",
        ),
    ]
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
        }
    }
}

impl ClusterConfig {
    /// Build the immutable ring; see [`NodeRing::new`] for what is rejected.
    pub fn ring(&self) -> Result<NodeRing> {
        NodeRing::new(self.nodes.clone())
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Heartbeat interval
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Per-probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Consecutive failures before failover
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Pause after a promotion before normal ticking resumes
    #[serde(default = "default_stabilization")]
    pub stabilization_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    3_000
}
fn default_probe_timeout() -> u64 {
    2_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_stabilization() -> u64 {
    3_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            probe_timeout_ms: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
            stabilization_ms: default_stabilization(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_millis(self.stabilization_ms)
    }
}

/// Routing layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Bind address for the client-facing HTTP API
    #[serde(default = "default_router_bind")]
    pub bind_addr: SocketAddr,

    /// Timeout for the per-request liveness probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Timeout for forwarding a write to the primary
    #[serde(default = "default_request_timeout")]
    pub forward_timeout_ms: u64,

    /// How often the background watch logs the primary (0 disables it)
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,
}

fn default_router_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
fn default_request_timeout() -> u64 {
    5_000
}
fn default_watch_interval() -> u64 {
    5_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_router_bind(),
            probe_timeout_ms: default_probe_timeout(),
            forward_timeout_ms: default_request_timeout(),
            watch_interval_ms: default_watch_interval(),
        }
    }
}

/// Write acknowledgment policy on the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// Acknowledge, then replicate in the background
    #[default]
    Eventual,
    /// Replicate to every peer before acknowledging
    Strong,
}

impl std::str::FromStr for ConsistencyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eventual" => Ok(ConsistencyMode::Eventual),
            "strong" => Ok(ConsistencyMode::Strong),
            other => Err(Error::InvalidConfig(format!(
                "unknown consistency mode: {}",
                other
            ))),
        }
    }
}

/// Ledger node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of this node in the ring
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Bind address for the write/read API
    #[serde(default = "default_node_bind")]
    pub bind_addr: SocketAddr,

    /// Bind address for the liveness probe
    #[serde(default = "default_health_bind")]
    pub health_addr: SocketAddr,

    /// Primary acknowledgment policy
    #[serde(default)]
    pub consistency: ConsistencyMode,

    /// Maximum in-flight requests served concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// sled directory; in-memory storage when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
}

fn default_node_name() -> String {
    "Factory".to_string()
}
fn default_node_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50051))
}
fn default_health_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8001))
}
fn default_max_concurrency() -> usize {
    10
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            bind_addr: default_node_bind(),
            health_addr: default_health_bind(),
            consistency: ConsistencyMode::default(),
            max_concurrency: default_max_concurrency(),
            data_path: None,
        }
    }
}

/// Replication propagator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Pending jobs before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Jobs executed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts per replica, first try included. Retries are opt-in.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff between attempts (doubles each retry)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Timeout for a single replica call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    1024
}
fn default_workers() -> usize {
    4
}
fn default_max_attempts() -> usize {
    1
}
fn default_retry_backoff() -> u64 {
    200
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ReplicationConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
