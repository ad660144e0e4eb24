//! Replication propagator
//!
//! Each accepted client write on the primary becomes one [`ReplicationJob`]
//! per peer. Jobs sit on a bounded queue drained by a dispatcher that runs up
//! to `workers` deliveries at a time. A delivery is attempted once unless
//! `max_attempts` allows retrying transport failures with backoff. Either way
//! the outcome is logged and counted, never reported to the client, so a
//! write can stay under-replicated.

use crate::client::NodeApi;
use crate::common::metrics::{write_counter, Counter};
use crate::common::{
    retry_with_backoff, Error, NodeDescriptor, RecordAck, ReplicationConfig, Result,
    TransactionRecord,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};

/// One write to push to one replica.
#[derive(Debug, Clone)]
pub struct ReplicationJob {
    pub target: NodeDescriptor,
    pub record: TransactionRecord,
}

/// Observable replication outcomes.
#[derive(Debug, Default)]
pub struct ReplicationStats {
    pub enqueued: Counter,
    pub succeeded: Counter,
    pub failed: Counter,
    pub dropped: Counter,
    pub retried: Counter,
}

impl ReplicationStats {
    /// Jobs that reached a final outcome.
    pub fn completed(&self) -> u64 {
        self.succeeded.get() + self.failed.get()
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        write_counter(
            &mut out,
            "custody_replication_enqueued_total",
            "Replication jobs enqueued",
            self.enqueued.get(),
        );
        write_counter(
            &mut out,
            "custody_replication_succeeded_total",
            "Replica writes acknowledged",
            self.succeeded.get(),
        );
        write_counter(
            &mut out,
            "custody_replication_failed_total",
            "Replica writes abandoned after retries",
            self.failed.get(),
        );
        write_counter(
            &mut out,
            "custody_replication_dropped_total",
            "Replication jobs dropped because the queue was full",
            self.dropped.get(),
        );
        write_counter(
            &mut out,
            "custody_replication_retries_total",
            "Replica write retries",
            self.retried.get(),
        );
        out
    }
}

/// Result of a synchronous replication round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Fans writes out from this node to its peers.
pub struct Propagator {
    source: Arc<str>,
    peers: Vec<NodeDescriptor>,
    api: Arc<dyn NodeApi>,
    config: ReplicationConfig,
    queue: mpsc::Sender<ReplicationJob>,
    stats: Arc<ReplicationStats>,
}

impl Propagator {
    /// Create the propagator and spawn its dispatcher on the current runtime.
    /// The dispatcher exits once the propagator is dropped.
    pub fn start(
        source: impl Into<String>,
        peers: Vec<NodeDescriptor>,
        api: Arc<dyn NodeApi>,
        config: ReplicationConfig,
    ) -> Self {
        let source: Arc<str> = source.into().into();
        let stats = Arc::new(ReplicationStats::default());
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));

        tokio::spawn(dispatch(
            rx,
            api.clone(),
            source.clone(),
            config.clone(),
            stats.clone(),
        ));

        Self {
            source,
            peers,
            api,
            config,
            queue,
            stats,
        }
    }

    pub fn peers(&self) -> &[NodeDescriptor] {
        &self.peers
    }

    pub fn stats(&self) -> Arc<ReplicationStats> {
        self.stats.clone()
    }

    /// Enqueue `record` for every peer and return immediately.
    ///
    /// Returns the number of jobs accepted by the queue; jobs that do not fit
    /// are dropped and counted.
    pub fn propagate(&self, record: &TransactionRecord) -> usize {
        let mut enqueued = 0;
        for peer in &self.peers {
            let job = ReplicationJob {
                target: peer.clone(),
                record: record.clone(),
            };
            match self.queue.try_send(job) {
                Ok(()) => {
                    self.stats.enqueued.inc();
                    enqueued += 1;
                }
                Err(TrySendError::Full(job)) => {
                    self.stats.dropped.inc();
                    tracing::warn!(
                        node = %job.target.name,
                        "Replication queue full, dropping write for {}",
                        job.record.batch_id
                    );
                }
                Err(TrySendError::Closed(job)) => {
                    self.stats.dropped.inc();
                    tracing::warn!(
                        node = %job.target.name,
                        "Replication dispatcher stopped, dropping write for {}",
                        job.record.batch_id
                    );
                }
            }
        }
        enqueued
    }

    /// Push `record` to every peer concurrently and wait for all outcomes.
    pub async fn replicate_now(&self, record: &TransactionRecord) -> ReplicationReport {
        let deliveries = self.peers.iter().map(|peer| {
            let job = ReplicationJob {
                target: peer.clone(),
                record: record.clone(),
            };
            let api = self.api.clone();
            let source = self.source.clone();
            let config = &self.config;
            let stats = &self.stats;
            async move {
                let outcome = deliver(api.as_ref(), &source, &job, config, stats).await;
                (job.target.name, outcome.is_ok())
            }
        });

        let mut report = ReplicationReport::default();
        for (node, ok) in futures_util::future::join_all(deliveries).await {
            if ok {
                report.succeeded.push(node);
            } else {
                report.failed.push(node);
            }
        }
        report
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<ReplicationJob>,
    api: Arc<dyn NodeApi>,
    source: Arc<str>,
    config: ReplicationConfig,
    stats: Arc<ReplicationStats>,
) {
    let workers = Arc::new(Semaphore::new(config.workers.max(1)));

    while let Some(job) = rx.recv().await {
        let permit = match workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let api = api.clone();
        let source = source.clone();
        let config = config.clone();
        let stats = stats.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let _ = deliver(api.as_ref(), &source, &job, &config, &stats).await;
        });
    }

    tracing::debug!("Replication dispatcher for {} stopped", source);
}

/// Deliver one job, retrying retryable failures, and record the outcome.
async fn deliver(
    api: &dyn NodeApi,
    source: &str,
    job: &ReplicationJob,
    config: &ReplicationConfig,
    stats: &ReplicationStats,
) -> Result<RecordAck> {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let target = &job.target;
    let record = &job.record;

    let result = retry_with_backoff(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            api.record(target, record, Some(source))
        },
        config.max_attempts,
        config.retry_backoff(),
    )
    .await;

    let attempts = attempts.load(Ordering::SeqCst) as u64;
    if attempts > 1 {
        stats.retried.add(attempts - 1);
    }

    match result {
        Ok(ack) => {
            stats.succeeded.inc();
            tracing::info!(node = %target.name, batch_id = %record.batch_id, "Replicated to {}", target.name);
            Ok(ack)
        }
        Err(e) => {
            stats.failed.inc();
            let err = Error::ReplicationFailed {
                node: target.name.clone(),
                reason: e.to_string(),
            };
            tracing::warn!(node = %target.name, batch_id = %record.batch_id, attempts, "{}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LedgerData;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fake replicas: records every call, fails the nodes listed as down.
    #[derive(Default)]
    struct FakeReplicas {
        down: HashSet<String>,
        calls: Mutex<HashMap<String, Vec<(TransactionRecord, Option<String>)>>>,
    }

    impl FakeReplicas {
        fn with_down(nodes: &[&str]) -> Self {
            Self {
                down: nodes.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls_to(&self, node: &str) -> usize {
            self.calls.lock().unwrap().get(node).map_or(0, |c| c.len())
        }
    }

    #[async_trait]
    impl NodeApi for FakeReplicas {
        async fn record(
            &self,
            node: &NodeDescriptor,
            record: &TransactionRecord,
            replicated_from: Option<&str>,
        ) -> Result<RecordAck> {
            self.calls
                .lock()
                .unwrap()
                .entry(node.name.clone())
                .or_default()
                .push((record.clone(), replicated_from.map(str::to_string)));
            if self.down.contains(&node.name) {
                return Err(Error::ConnectionFailed(format!("{} refused", node.name)));
            }
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

    fn peers() -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::new("B", "http://b", "http://b/health"),
            NodeDescriptor::new("C", "http://c", "http://c/health"),
        ]
    }

    fn config(max_attempts: usize) -> ReplicationConfig {
        ReplicationConfig {
            queue_capacity: 16,
            workers: 2,
            max_attempts,
            retry_backoff_ms: 1,
            request_timeout_ms: 100,
        }
    }

    async fn wait_for(stats: &ReplicationStats, completed: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.completed() < completed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("replication did not complete");
    }

    #[tokio::test]
    async fn test_each_peer_attempted_exactly_once() {
        let api = Arc::new(FakeReplicas::default());
        let propagator = Propagator::start("A", peers(), api.clone(), config(1));
        let record = TransactionRecord::new("X1", "A", "B", "Shipped");

        assert_eq!(propagator.propagate(&record), 2);
        wait_for(&propagator.stats(), 2).await;

        assert_eq!(api.calls_to("B"), 1);
        assert_eq!(api.calls_to("C"), 1);
        assert_eq!(api.calls_to("A"), 0);
        let calls = api.calls.lock().unwrap();
        let (sent, source) = &calls["B"][0];
        assert_eq!(sent, &record);
        assert_eq!(source.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_default_config_never_retries() {
        let api = Arc::new(FakeReplicas::with_down(&["B", "C"]));
        let propagator =
            Propagator::start("A", peers(), api.clone(), ReplicationConfig::default());

        propagator.propagate(&TransactionRecord::new("X1", "A", "B", "Shipped"));
        let stats = propagator.stats();
        wait_for(&stats, 2).await;

        assert_eq!(api.calls_to("B"), 1);
        assert_eq!(api.calls_to("C"), 1);
        assert_eq!(stats.retried.get(), 0);
        assert_eq!(stats.failed.get(), 2);
    }

    #[tokio::test]
    async fn test_failed_replica_does_not_block_others() {
        let api = Arc::new(FakeReplicas::with_down(&["B"]));
        let propagator = Propagator::start("A", peers(), api.clone(), config(1));

        propagator.propagate(&TransactionRecord::new("X1", "A", "B", "Shipped"));
        let stats = propagator.stats();
        wait_for(&stats, 2).await;

        assert_eq!(stats.succeeded.get(), 1);
        assert_eq!(stats.failed.get(), 1);
        assert_eq!(api.calls_to("C"), 1);
    }

    #[tokio::test]
    async fn test_bounded_retry() {
        let api = Arc::new(FakeReplicas::with_down(&["C"]));
        let propagator = Propagator::start("A", peers(), api.clone(), config(3));

        propagator.propagate(&TransactionRecord::new("X1", "A", "B", "Shipped"));
        let stats = propagator.stats();
        wait_for(&stats, 2).await;

        assert_eq!(api.calls_to("B"), 1);
        assert_eq!(api.calls_to("C"), 3);
        assert_eq!(stats.retried.get(), 2);
        assert_eq!(stats.failed.get(), 1);
    }

    #[tokio::test]
    async fn test_replicate_now_reports_outcomes() {
        let api = Arc::new(FakeReplicas::with_down(&["C"]));
        let propagator = Propagator::start("A", peers(), api, config(1));

        let report = propagator
            .replicate_now(&TransactionRecord::new("X1", "A", "B", "Shipped"))
            .await;
        assert_eq!(report.succeeded, vec!["B".to_string()]);
        assert_eq!(report.failed, vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let api = Arc::new(FakeReplicas::default());
        let mut cfg = config(1);
        cfg.queue_capacity = 1;
        let propagator = Propagator::start("A", peers(), api, cfg);

        let mut enqueued = 0;
        for i in 0..50 {
            enqueued += propagator.propagate(&TransactionRecord::new(
                format!("X{}", i),
                "A",
                "B",
                "Shipped",
            ));
        }
        let stats = propagator.stats();
        assert_eq!(stats.enqueued.get() + stats.dropped.get(), 100);
        assert_eq!(stats.enqueued.get(), enqueued as u64);
    }
}
