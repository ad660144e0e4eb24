//! Health monitor loop

use super::policy::{FailoverState, PromotionPolicy, RoundRobin};
use super::tracker::FailureTracker;
use crate::client::Prober;
use crate::common::metrics::{Counter, Gauge};
use crate::common::{MonitorConfig, NodeDescriptor, NodeRing, Result};
use crate::pointer::{PrimaryPointer, PrimarySnapshot};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// What one probe cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Primary answered; failure counter is zero.
    Healthy { node: String },
    /// Primary missed a probe, threshold not reached yet.
    Failed { node: String, failures: u32 },
    /// Threshold reached and a new primary was designated. `epoch` is `None`
    /// when publishing the pointer failed.
    Promoted {
        from: String,
        to: String,
        epoch: Option<u64>,
    },
}

/// Counters describing monitor activity.
#[derive(Debug, Default)]
pub struct MonitorStats {
    pub probes_ok: Counter,
    pub probes_failed: Counter,
    pub failovers: Counter,
    pub publish_errors: Counter,
    pub primary_index: Gauge,
    pub epoch: Gauge,
}

/// Single sequential control loop that watches the current primary and fails
/// over to the next node chosen by its [`PromotionPolicy`].
pub struct HealthMonitor {
    ring: NodeRing,
    pointer: PrimaryPointer,
    prober: Arc<dyn Prober>,
    policy: Box<dyn PromotionPolicy>,
    config: MonitorConfig,
    current: usize,
    /// `current` has not reached the pointer yet
    unpublished: bool,
    tracker: FailureTracker,
    stats: Arc<MonitorStats>,
}

impl HealthMonitor {
    pub fn new(
        ring: NodeRing,
        pointer: PrimaryPointer,
        prober: Arc<dyn Prober>,
        config: MonitorConfig,
    ) -> Self {
        let tracker = FailureTracker::new(config.failure_threshold);
        Self {
            ring,
            pointer,
            prober,
            policy: Box::new(RoundRobin),
            config,
            current: 0,
            unpublished: true,
            tracker,
            stats: Arc::new(MonitorStats::default()),
        }
    }

    /// Replace the default round-robin policy.
    pub fn with_policy(mut self, policy: Box<dyn PromotionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn current_primary(&self) -> &NodeDescriptor {
        // `current` only ever holds indices returned for this ring
        self.ring.get(self.current).unwrap_or(self.ring.default_primary())
    }

    pub fn failures(&self) -> u32 {
        self.tracker.failures()
    }

    pub fn stats(&self) -> Arc<MonitorStats> {
        self.stats.clone()
    }

    /// Designate the ring's first node as primary.
    pub async fn start(&mut self) -> Result<PrimarySnapshot> {
        self.current = 0;
        self.tracker.reset();
        let primary = self.current_primary().clone();
        tracing::info!(
            "Monitoring started. Primary: {} (policy: {}, threshold: {})",
            primary,
            self.policy.name(),
            self.tracker.threshold()
        );
        self.stats.primary_index.set(self.current as u64);
        self.publish_current().await
    }

    /// Publish the in-memory primary. On failure it stays pending and the
    /// next tick tries again.
    async fn publish_current(&mut self) -> Result<PrimarySnapshot> {
        let name = self.current_primary().name.clone();
        match self.pointer.publish(&name).await {
            Ok(snapshot) => {
                self.unpublished = false;
                self.stats.epoch.set(snapshot.epoch);
                Ok(snapshot)
            }
            Err(e) => {
                self.unpublished = true;
                self.stats.publish_errors.inc();
                Err(e)
            }
        }
    }

    /// Whether the current primary still has to be written to the pointer.
    pub fn publish_pending(&self) -> bool {
        self.unpublished
    }

    /// Run one probe cycle against the current primary.
    ///
    /// A primary whose publication failed earlier is published first, so the
    /// pointer catches up even while the primary stays healthy.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.unpublished {
            match self.publish_current().await {
                Ok(snapshot) => tracing::info!(
                    node = %snapshot.node,
                    epoch = snapshot.epoch,
                    "Published pending primary {}",
                    snapshot.node
                ),
                Err(e) => tracing::error!("Primary pointer still not published: {}", e),
            }
        }

        let primary = self.current_primary().clone();

        match self.prober.probe(&primary).await {
            Ok(()) => {
                self.stats.probes_ok.inc();
                self.tracker.record_success();
                tracing::debug!(node = %primary.name, "Primary healthy");
                TickOutcome::Healthy { node: primary.name }
            }
            Err(e) => {
                self.stats.probes_failed.inc();
                let breached = self.tracker.record_failure();
                tracing::warn!(
                    node = %primary.name,
                    "Heartbeat failed ({}/{}) for {}: {}",
                    self.tracker.failures(),
                    self.tracker.threshold(),
                    primary.name,
                    e
                );
                if breached {
                    self.fail_over(primary).await
                } else {
                    TickOutcome::Failed {
                        node: primary.name,
                        failures: self.tracker.failures(),
                    }
                }
            }
        }
    }

    async fn fail_over(&mut self, demoted: NodeDescriptor) -> TickOutcome {
        let next = self.policy.next_primary(&FailoverState {
            current: self.current,
            ring_len: self.ring.len(),
        });
        let next = if next < self.ring.len() {
            next
        } else {
            tracing::error!(
                "Promotion policy {} returned out-of-range index {}, wrapping",
                self.policy.name(),
                next
            );
            next % self.ring.len()
        };

        self.current = next;
        self.tracker.reset();
        self.stats.failovers.inc();
        self.stats.primary_index.set(next as u64);

        let promoted = self.current_primary().clone();
        tracing::warn!(
            from = %demoted.name,
            to = %promoted.name,
            "Promoting {} as new primary",
            promoted.name
        );

        let epoch = match self.publish_current().await {
            Ok(snapshot) => Some(snapshot.epoch),
            Err(e) => {
                tracing::error!(node = %promoted.name, "Failed to publish new primary: {}", e);
                None
            }
        };

        TickOutcome::Promoted {
            from: demoted.name,
            to: promoted.name,
            epoch,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.start().await {
            tracing::error!("Failed to publish initial primary: {}", e);
        }

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            if let TickOutcome::Promoted { .. } = self.tick().await {
                // Give the promoted node time to settle before probing it
                tokio::select! {
                    _ = tokio::time::sleep(self.config.stabilization()) => {}
                    _ = shutdown.changed() => break,
                }
                interval.reset();
            }
        }

        tracing::info!("Health monitor stopped");
    }

    /// Start the loop on a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Error, NodeDescriptor};
    use crate::pointer::{MemoryPointerStore, PointerStore};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Prober replaying scripted outcomes per node; unscripted probes succeed.
    #[derive(Default)]
    struct ScriptedProber {
        script: Mutex<HashMap<String, VecDeque<bool>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProber {
        fn push(&self, node: &str, outcomes: &[bool]) {
            self.script
                .lock()
                .unwrap()
                .entry(node.to_string())
                .or_default()
                .extend(outcomes.iter().copied());
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, node: &NodeDescriptor) -> Result<()> {
            self.calls.lock().unwrap().push(node.name.clone());
            let alive = self
                .script
                .lock()
                .unwrap()
                .get_mut(&node.name)
                .and_then(|q| q.pop_front())
                .unwrap_or(true);
            if alive {
                Ok(())
            } else {
                Err(Error::ProbeFailed {
                    node: node.name.clone(),
                    reason: "scripted".into(),
                })
            }
        }
    }

    fn ring() -> NodeRing {
        NodeRing::new(vec![
            NodeDescriptor::new("A", "http://a", "http://a/health"),
            NodeDescriptor::new("B", "http://b", "http://b/health"),
            NodeDescriptor::new("C", "http://c", "http://c/health"),
        ])
        .unwrap()
    }

    /// In-memory store whose `fail_on`-th write (1-based) fails.
    struct FlakyStore {
        inner: MemoryPointerStore,
        writes: AtomicUsize,
        fail_on: usize,
    }

    impl FlakyStore {
        fn failing_write(fail_on: usize) -> Self {
            Self {
                inner: MemoryPointerStore::new(),
                writes: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl PointerStore for FlakyStore {
        async fn load(&self) -> Result<Option<PrimarySnapshot>> {
            self.inner.load().await
        }

        async fn store(&self, snapshot: &PrimarySnapshot) -> Result<()> {
            if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.store(snapshot).await
        }
    }

    fn monitor(prober: Arc<ScriptedProber>) -> (HealthMonitor, PrimaryPointer) {
        monitor_with(prober, PrimaryPointer::in_memory())
    }

    fn monitor_with(
        prober: Arc<ScriptedProber>,
        pointer: PrimaryPointer,
    ) -> (HealthMonitor, PrimaryPointer) {
        let config = MonitorConfig {
            interval_ms: 10,
            probe_timeout_ms: 10,
            failure_threshold: 3,
            stabilization_ms: 10,
        };
        let monitor = HealthMonitor::new(ring(), pointer.clone(), prober, config);
        (monitor, pointer)
    }

    #[tokio::test]
    async fn test_start_publishes_first_node() {
        let (mut monitor, pointer) = monitor(Arc::new(ScriptedProber::default()));
        let snapshot = monitor.start().await.unwrap();
        assert_eq!(snapshot.node, "A");
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "A");
    }

    #[tokio::test]
    async fn test_promotes_only_at_threshold() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("A", &[false, false, false]);
        let (mut monitor, pointer) = monitor(prober);
        monitor.start().await.unwrap();

        assert_eq!(
            monitor.tick().await,
            TickOutcome::Failed {
                node: "A".into(),
                failures: 1
            }
        );
        assert!(matches!(monitor.tick().await, TickOutcome::Failed { failures: 2, .. }));
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "A");

        assert_eq!(
            monitor.tick().await,
            TickOutcome::Promoted {
                from: "A".into(),
                to: "B".into(),
                epoch: Some(2)
            }
        );
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "B");
        assert_eq!(monitor.failures(), 0);
        assert_eq!(monitor.stats().failovers.get(), 1);
    }

    #[tokio::test]
    async fn test_failed_publish_retried_while_promoted_node_healthy() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("A", &[false, false, false]);
        // Second write (the failover) fails
        let pointer = PrimaryPointer::new(Arc::new(FlakyStore::failing_write(2)));
        let (mut monitor, pointer) = monitor_with(prober, pointer);
        monitor.start().await.unwrap();

        monitor.tick().await;
        monitor.tick().await;
        assert_eq!(
            monitor.tick().await,
            TickOutcome::Promoted {
                from: "A".into(),
                to: "B".into(),
                epoch: None
            }
        );
        assert!(monitor.publish_pending());
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "A");

        // B is healthy, so no further failover would publish it
        assert_eq!(
            monitor.tick().await,
            TickOutcome::Healthy { node: "B".into() }
        );
        assert!(!monitor.publish_pending());
        let snapshot = pointer.read().await.unwrap().unwrap();
        assert_eq!(snapshot.node, "B");
        assert_eq!(snapshot.epoch, 2);
        assert_eq!(monitor.stats().publish_errors.get(), 1);
        assert_eq!(monitor.stats().epoch.get(), 2);
    }

    #[tokio::test]
    async fn test_failed_initial_publish_retried_on_tick() {
        let pointer = PrimaryPointer::new(Arc::new(FlakyStore::failing_write(1)));
        let (mut monitor, pointer) = monitor_with(Arc::new(ScriptedProber::default()), pointer);

        assert!(monitor.start().await.is_err());
        assert!(pointer.read().await.unwrap().is_none());

        monitor.tick().await;
        let snapshot = pointer.read().await.unwrap().unwrap();
        assert_eq!(snapshot.node, "A");
        assert_eq!(snapshot.epoch, 1);
    }

    #[tokio::test]
    async fn test_interleaved_success_resets_counter() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("A", &[false, false, true, false, false, true]);
        let (mut monitor, pointer) = monitor(prober);
        monitor.start().await.unwrap();

        for _ in 0..6 {
            assert!(!matches!(monitor.tick().await, TickOutcome::Promoted { .. }));
        }
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "A");
        assert_eq!(monitor.stats().failovers.get(), 0);
    }

    #[tokio::test]
    async fn test_promotion_does_not_probe_candidate() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("A", &[false, false, false]);
        // B is down too, but promotion does not check it
        prober.push("B", &[false]);
        let (mut monitor, pointer) = monitor(prober.clone());
        monitor.start().await.unwrap();

        for _ in 0..3 {
            monitor.tick().await;
        }
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "B");
        assert_eq!(*prober.calls.lock().unwrap(), vec!["A", "A", "A"]);
    }

    #[tokio::test]
    async fn test_ring_walks_forward_and_never_reverts() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("A", &[false, false, false]);
        prober.push("B", &[false, false, false]);
        let (mut monitor, pointer) = monitor(prober.clone());
        monitor.start().await.unwrap();

        for _ in 0..6 {
            monitor.tick().await;
        }
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "C");

        // A is healthy again (unscripted probes succeed); C stays primary
        for _ in 0..3 {
            assert_eq!(
                monitor.tick().await,
                TickOutcome::Healthy { node: "C".into() }
            );
        }
        let snapshot = pointer.read().await.unwrap().unwrap();
        assert_eq!(snapshot.node, "C");
        assert_eq!(snapshot.epoch, 3);
    }

    #[tokio::test]
    async fn test_custom_policy_is_used() {
        struct AlwaysLast;
        impl PromotionPolicy for AlwaysLast {
            fn next_primary(&self, state: &FailoverState) -> usize {
                state.ring_len - 1
            }
            fn name(&self) -> &'static str {
                "always-last"
            }
        }

        let prober = Arc::new(ScriptedProber::default());
        prober.push("A", &[false, false, false]);
        let (monitor, pointer) = monitor(prober);
        let mut monitor = monitor.with_policy(Box::new(AlwaysLast));
        monitor.start().await.unwrap();

        for _ in 0..3 {
            monitor.tick().await;
        }
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "C");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (monitor, pointer) = monitor(Arc::new(ScriptedProber::default()));
        let (tx, rx) = watch::channel(false);
        let handle = monitor.spawn(rx);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
        assert_eq!(pointer.read().await.unwrap().unwrap().node, "A");
    }
}
