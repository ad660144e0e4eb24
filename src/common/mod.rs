//! Common utilities and types shared across custody

pub mod config;
pub mod error;
pub mod metrics;
pub mod ring;
pub mod tracing_middleware;
pub mod types;
pub mod utils;

pub use config::{
    ClusterConfig, Config, ConsistencyMode, MonitorConfig, NodeConfig, ReplicationConfig,
    RouterConfig,
};
pub use error::{Error, Result};
pub use ring::{NodeDescriptor, NodeRing};
pub use types::{
    LedgerData, RecordAck, SubmitAccepted, SubmitRejected, TransactionRecord,
    REPLICATED_FROM_HEADER,
};
pub use utils::{
    parse_duration, retry_with_backoff, shutdown_on_ctrl_c, shutdown_signal, timestamp_now,
    NodeState,
};
