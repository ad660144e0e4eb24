//! HTTP API of a ledger node
//!
//! Write/read endpoints live on the node's API listener; the liveness probe is
//! served from a separate router bound to its own address.

use crate::common::metrics::{write_counter, write_gauge, Counter};
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{
    ConsistencyMode, LedgerData, RecordAck, TransactionRecord, REPLICATED_FROM_HEADER,
};
use crate::node::store::Ledger;
use crate::replication::Propagator;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Transaction records are a few short strings
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Request counters of one node
#[derive(Debug, Default)]
pub struct NodeMetrics {
    pub client_writes: Counter,
    pub replicated_writes: Counter,
    pub storage_errors: Counter,
}

/// Shared state of a node's handlers
#[derive(Clone)]
pub struct LedgerState {
    pub name: Arc<str>,
    pub ledger: Ledger,
    pub propagator: Arc<Propagator>,
    pub consistency: ConsistencyMode,
    pub metrics: Arc<NodeMetrics>,
}

/// Creates the write/read router. At most `max_concurrency` requests are
/// served at once; further requests wait for a slot.
pub fn create_router(state: LedgerState, max_concurrency: usize) -> Router {
    Router::new()
        .route("/record", post(record_transaction))
        .route("/ledger", get(get_ledger))
        .route("/metrics", get(metrics))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrency.max(1)))
        .with_state(state)
}

/// Creates the liveness router (`GET /health`).
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn storage_error(state: &LedgerState, e: crate::Error) -> Response {
    state.metrics.storage_errors.inc();
    tracing::error!(node = %state.name, "Ledger storage error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

/// Append a transaction. Client writes (no replication header) are propagated
/// to every peer; replicated writes are only stored.
async fn record_transaction(
    State(state): State<LedgerState>,
    headers: HeaderMap,
    Json(record): Json<TransactionRecord>,
) -> Response {
    if let Err(e) = state.ledger.append(&record) {
        return storage_error(&state, e);
    }

    let replicated_from = headers
        .get(REPLICATED_FROM_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Some(source) = replicated_from {
        state.metrics.replicated_writes.inc();
        tracing::info!(node = %state.name, source = %source, "Replicated: {}", record);
        return Json(RecordAck {
            message: format!("Transaction recorded at {}.", state.name),
        })
        .into_response();
    }

    state.metrics.client_writes.inc();
    tracing::info!(node = %state.name, "Recorded: {}", record);

    let message = match state.consistency {
        ConsistencyMode::Eventual => {
            state.propagator.propagate(&record);
            format!("Recorded at {} (Eventual Consistency).", state.name)
        }
        ConsistencyMode::Strong => {
            let report = state.propagator.replicate_now(&record).await;
            if !report.failed.is_empty() {
                tracing::warn!(
                    node = %state.name,
                    "Write {} acknowledged without replicas {:?}",
                    record.batch_id,
                    report.failed
                );
            }
            format!("Recorded & replicated at {} (Strong Consistency).", state.name)
        }
    };

    Json(RecordAck { message }).into_response()
}

/// Return every stored record.
async fn get_ledger(State(state): State<LedgerState>) -> Response {
    match state.ledger.list() {
        Ok(entries) => Json(LedgerData {
            node: state.name.to_string(),
            entries,
        })
        .into_response(),
        Err(e) => storage_error(&state, e),
    }
}

async fn metrics(State(state): State<LedgerState>) -> impl IntoResponse {
    let mut out = String::new();
    write_gauge(
        &mut out,
        "custody_ledger_records",
        "Records stored on this node",
        state.ledger.len().unwrap_or(0) as u64,
    );
    write_counter(
        &mut out,
        "custody_client_writes_total",
        "Writes received from clients",
        state.metrics.client_writes.get(),
    );
    write_counter(
        &mut out,
        "custody_replicated_writes_total",
        "Writes received from a primary",
        state.metrics.replicated_writes.get(),
    );
    write_counter(
        &mut out,
        "custody_storage_errors_total",
        "Ledger storage failures",
        state.metrics.storage_errors.get(),
    );
    out += &state.propagator.stats().to_prometheus();

    (StatusCode::OK, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{HttpNodeClient, NodeApi};
    use crate::common::{NodeDescriptor, ReplicationConfig, Result};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    /// Node with no peers, served on an ephemeral port.
    async fn spawn_node(consistency: ConsistencyMode) -> (String, Ledger) {
        let api = Arc::new(HttpNodeClient::new(Duration::from_secs(1)).unwrap());
        let (base, ledger, _) = spawn_node_with(consistency, vec![], api).await;
        (base, ledger)
    }

    async fn spawn_node_with(
        consistency: ConsistencyMode,
        peers: Vec<NodeDescriptor>,
        api: Arc<dyn NodeApi>,
    ) -> (String, Ledger, Arc<Propagator>) {
        let ledger = Ledger::new_memory();
        let propagator = Arc::new(Propagator::start(
            "Factory",
            peers,
            api,
            ReplicationConfig::default(),
        ));
        let state = LedgerState {
            name: "Factory".into(),
            ledger: ledger.clone(),
            propagator: propagator.clone(),
            consistency,
            metrics: Arc::new(NodeMetrics::default()),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state, 4)).await.unwrap();
        });
        (format!("http://{}", addr), ledger, propagator)
    }

    /// Replica whose writes hang until `release` is notified.
    #[derive(Default)]
    struct HangingReplica {
        release: Notify,
    }

    #[async_trait]
    impl NodeApi for HangingReplica {
        async fn record(
            &self,
            node: &NodeDescriptor,
            _record: &TransactionRecord,
            _replicated_from: Option<&str>,
        ) -> Result<RecordAck> {
            self.release.notified().await;
            Ok(RecordAck {
                message: format!("Transaction recorded at {}.", node.name),
            })
        }

        async fn ledger(&self, node: &NodeDescriptor) -> Result<LedgerData> {
            Ok(LedgerData {
                node: node.name.clone(),
                entries: vec![],
            })
        }
    }

    fn record() -> TransactionRecord {
        TransactionRecord::new("MED1001", "Factory", "Distributor", "Shipped")
    }

    #[tokio::test]
    async fn test_client_write_acknowledged_per_mode() {
        let (base, _) = spawn_node(ConsistencyMode::Eventual).await;
        let ack: RecordAck = reqwest::Client::new()
            .post(format!("{}/record", base))
            .json(&record())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack.message, "Recorded at Factory (Eventual Consistency).");

        let (base, _) = spawn_node(ConsistencyMode::Strong).await;
        let ack: RecordAck = reqwest::Client::new()
            .post(format!("{}/record", base))
            .json(&record())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            ack.message,
            "Recorded & replicated at Factory (Strong Consistency)."
        );
    }

    #[tokio::test]
    async fn test_replicated_write_is_stored_only() {
        let (base, ledger) = spawn_node(ConsistencyMode::Eventual).await;
        let ack: RecordAck = reqwest::Client::new()
            .post(format!("{}/record", base))
            .header(REPLICATED_FROM_HEADER, "Pharmacy")
            .json(&record())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack.message, "Transaction recorded at Factory.");
        assert_eq!(ledger.list().unwrap(), vec![record()]);
    }

    #[tokio::test]
    async fn test_duplicates_kept_in_order() {
        let (base, _) = spawn_node(ConsistencyMode::Eventual).await;
        let client = reqwest::Client::new();
        let second = TransactionRecord::new("MED1001", "Distributor", "Pharmacy", "Delivered");
        for r in [record(), second.clone(), record()] {
            client
                .post(format!("{}/record", base))
                .json(&r)
                .send()
                .await
                .unwrap();
        }

        let data: LedgerData = client
            .get(format!("{}/ledger", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(data.node, "Factory");
        assert_eq!(data.entries, vec![record(), second, record()]);
    }

    #[tokio::test]
    async fn test_malformed_record_rejected() {
        let (base, ledger) = spawn_node(ConsistencyMode::Eventual).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/record", base))
            .json(&serde_json::json!({ "batch_id": "X1" }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
        assert_eq!(ledger.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_eventual_ack_does_not_wait_for_replicas() {
        let replica = Arc::new(HangingReplica::default());
        let peers = vec![NodeDescriptor::new(
            "Distributor",
            "http://distributor",
            "http://distributor/health",
        )];
        let (base, ledger, propagator) =
            spawn_node_with(ConsistencyMode::Eventual, peers, replica.clone()).await;

        let ack: RecordAck = tokio::time::timeout(Duration::from_secs(2), async {
            reqwest::Client::new()
                .post(format!("{}/record", base))
                .json(&record())
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        })
        .await
        .expect("ack waited for the hung replica");
        assert_eq!(ack.message, "Recorded at Factory (Eventual Consistency).");
        assert_eq!(ledger.list().unwrap(), vec![record()]);

        let stats = propagator.stats();
        assert_eq!(stats.enqueued.get(), 1);
        assert_eq!(stats.completed(), 0);

        // notify_one stores a permit, so the delivery finishes even if it
        // has not reached the replica yet
        replica.release.notify_one();
        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.succeeded.get() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("delivery never finished");
    }
}
