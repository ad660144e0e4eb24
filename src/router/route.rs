//! Write routing
//!
//! Per request: read the published primary, probe it, forward the write.
//! Nothing is buffered or retried here. A primary that is down yields
//! [`Error::PrimaryUnavailable`] and the caller decides when to retry.
//! Liveness can still flip between the probe and the forward; that surfaces
//! as [`Error::ForwardFailed`].

use crate::client::{NodeApi, Prober};
use crate::common::metrics::{write_counter, write_histogram, Counter, Histogram};
use crate::common::{
    Error, NodeDescriptor, NodeRing, Result, SubmitAccepted, TransactionRecord,
};
use crate::pointer::PrimaryPointer;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Routing counters
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub routed: Counter,
    pub primary_unavailable: Counter,
    pub forward_failed: Counter,
    pub pointer_fallbacks: Counter,
    pub forward_latency: Histogram,
}

impl RouterMetrics {
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        write_counter(
            &mut out,
            "custody_routed_total",
            "Writes forwarded to the primary",
            self.routed.get(),
        );
        write_counter(
            &mut out,
            "custody_primary_unavailable_total",
            "Writes rejected because the primary was down",
            self.primary_unavailable.get(),
        );
        write_counter(
            &mut out,
            "custody_forward_failed_total",
            "Forwards that failed after a successful probe",
            self.forward_failed.get(),
        );
        write_counter(
            &mut out,
            "custody_pointer_fallbacks_total",
            "Reads that fell back to the default primary because the pointer was unreadable",
            self.pointer_fallbacks.get(),
        );
        write_histogram(
            &mut out,
            "custody_forward_duration_ms",
            "Forward latency in milliseconds",
            &self.forward_latency,
        );
        out
    }
}

/// Primary as seen by the router at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryView {
    pub primary: String,
    pub epoch: u64,
}

/// Stateless front door for writes. Cheap to share behind an `Arc`.
pub struct WriteRouter {
    ring: NodeRing,
    pointer: PrimaryPointer,
    prober: Arc<dyn Prober>,
    nodes: Arc<dyn NodeApi>,
    highest_epoch: AtomicU64,
    metrics: Arc<RouterMetrics>,
}

impl WriteRouter {
    pub fn new(
        ring: NodeRing,
        pointer: PrimaryPointer,
        prober: Arc<dyn Prober>,
        nodes: Arc<dyn NodeApi>,
    ) -> Self {
        Self {
            ring,
            pointer,
            prober,
            nodes,
            highest_epoch: AtomicU64::new(0),
            metrics: Arc::new(RouterMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<RouterMetrics> {
        self.metrics.clone()
    }

    pub fn ring(&self) -> &NodeRing {
        &self.ring
    }

    /// Read the published primary, falling back to the ring's first node when
    /// nothing is published or the pointer cannot be read.
    pub async fn current_primary(&self) -> PrimaryView {
        let view = match self.pointer.read().await {
            Ok(Some(snapshot)) => PrimaryView {
                primary: snapshot.node,
                epoch: snapshot.epoch,
            },
            Ok(None) => PrimaryView {
                primary: self.ring.default_primary().name.clone(),
                epoch: 0,
            },
            Err(e) => {
                self.metrics.pointer_fallbacks.inc();
                tracing::warn!("Primary pointer unreadable, using default primary: {}", e);
                PrimaryView {
                    primary: self.ring.default_primary().name.clone(),
                    epoch: 0,
                }
            }
        };
        self.observe_epoch(&view);
        view
    }

    fn observe_epoch(&self, view: &PrimaryView) {
        let previous = self.highest_epoch.fetch_max(view.epoch, Ordering::SeqCst);
        if view.epoch > previous && previous != 0 {
            tracing::info!(
                epoch = view.epoch,
                "Observed primary change to {}",
                view.primary
            );
        } else if view.epoch < previous && view.epoch != 0 {
            tracing::warn!(
                epoch = view.epoch,
                highest = previous,
                "Primary pointer went backwards; using {} anyway",
                view.primary
            );
        }
    }

    fn resolve(&self, view: &PrimaryView) -> Result<NodeDescriptor> {
        self.ring.find(&view.primary).cloned().ok_or_else(|| {
            tracing::warn!("Published primary {} is not a ring member", view.primary);
            Error::PrimaryUnavailable {
                node: view.primary.clone(),
            }
        })
    }

    /// Route one write to the current primary.
    pub async fn route_write(&self, record: &TransactionRecord) -> Result<SubmitAccepted> {
        let view = self.current_primary().await;
        let node = match self.resolve(&view) {
            Ok(node) => node,
            Err(e) => {
                self.metrics.primary_unavailable.inc();
                return Err(e);
            }
        };

        if let Err(e) = self.prober.probe(&node).await {
            self.metrics.primary_unavailable.inc();
            tracing::warn!(node = %node.name, epoch = view.epoch, "Rejecting write: {}", e);
            return Err(Error::PrimaryUnavailable { node: node.name });
        }

        tracing::info!(node = %node.name, epoch = view.epoch, "Routing request to active primary: {}", node);

        let start = Instant::now();
        let ack = self.nodes.record(&node, record, None).await.map_err(|e| {
            self.metrics.forward_failed.inc();
            tracing::error!(node = %node.name, "Forward failed: {}", e);
            Error::ForwardFailed {
                node: node.name.clone(),
                reason: e.to_string(),
            }
        })?;
        self.metrics
            .forward_latency
            .observe(start.elapsed().as_secs_f64() * 1000.0);
        self.metrics.routed.inc();

        Ok(SubmitAccepted {
            message: ack.message,
            node_used: node.name,
            epoch: view.epoch,
        })
    }

    /// Current primary and whether it answers its probe right now.
    pub async fn primary_status(&self) -> (PrimaryView, bool) {
        let view = self.current_primary().await;
        let alive = match self.ring.find(&view.primary) {
            Some(node) => self.prober.is_alive(node).await,
            None => false,
        };
        (view, alive)
    }
}
