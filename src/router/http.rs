//! Client-facing HTTP API of the routing layer

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{Error, SubmitRejected, TransactionRecord};
use crate::router::route::WriteRouter;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct RouterState {
    pub router: Arc<WriteRouter>,
}

pub fn create_router(state: RouterState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/record", post(submit_record))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Show which node currently takes writes.
async fn status(State(state): State<RouterState>) -> impl IntoResponse {
    let (view, alive) = state.router.primary_status().await;
    Json(json!({
        "service": "custody-router",
        "primary": view.primary,
        "epoch": view.epoch,
        "alive": alive,
        "version": crate::VERSION,
    }))
}

/// Route a transaction to the primary.
///
/// * 200 `{message, node_used, epoch}` once the primary acknowledged
/// * 503 `{error, node_used}` when the primary is down; retry after failover
/// * 500 `{error, node_used}` when the forward itself failed
async fn submit_record(
    State(state): State<RouterState>,
    Json(record): Json<TransactionRecord>,
) -> Response {
    match state.router.route_write(&record).await {
        Ok(accepted) => (StatusCode::OK, Json(accepted)).into_response(),
        Err(e) => {
            let node_used = match &e {
                Error::PrimaryUnavailable { node } | Error::ForwardFailed { node, .. } => {
                    node.clone()
                }
                _ => String::new(),
            };
            (
                e.to_http_status(),
                Json(SubmitRejected {
                    error: e.to_string(),
                    node_used,
                }),
            )
                .into_response()
        }
    }
}

async fn metrics(State(state): State<RouterState>) -> impl IntoResponse {
    (StatusCode::OK, state.router.metrics().to_prometheus())
}
