//! Routing layer server

use crate::client::{HttpNodeClient, HttpProber};
use crate::common::{shutdown_signal, NodeRing, Result, RouterConfig};
use crate::pointer::PrimaryPointer;
use crate::router::http::{create_router, RouterState};
use crate::router::route::WriteRouter;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct RoutingServer {
    config: RouterConfig,
    router: Arc<WriteRouter>,
}

impl RoutingServer {
    /// Build a server that probes and forwards over HTTP.
    pub fn new(config: RouterConfig, ring: NodeRing, pointer: PrimaryPointer) -> Result<Self> {
        let prober = Arc::new(HttpProber::new(Duration::from_millis(config.probe_timeout_ms))?);
        let nodes = Arc::new(HttpNodeClient::new(Duration::from_millis(
            config.forward_timeout_ms,
        ))?);
        let router = Arc::new(WriteRouter::new(ring, pointer, prober, nodes));
        Ok(Self::with_router(config, router))
    }

    pub fn with_router(config: RouterConfig, router: Arc<WriteRouter>) -> Self {
        Self { config, router }
    }

    pub fn router(&self) -> Arc<WriteRouter> {
        self.router.clone()
    }

    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_with(listener, shutdown).await
    }

    pub async fn serve_with(
        self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!("Starting routing layer");
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!(
            "  Nodes: {}",
            self.router
                .ring()
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let watch_task = (self.config.watch_interval_ms > 0).then(|| {
            spawn_primary_watch(
                self.router.clone(),
                Duration::from_millis(self.config.watch_interval_ms),
                shutdown.clone(),
            )
        });

        let app = create_router(RouterState {
            router: self.router.clone(),
        });

        tracing::info!("✓ Routing layer ready");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await;

        if let Some(task) = watch_task {
            task.abort();
        }
        result?;

        tracing::info!("Routing layer stopped");
        Ok(())
    }
}

/// Periodically log the current primary and whether it answers probes.
pub fn spawn_primary_watch(
    router: Arc<WriteRouter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (view, alive) = router.primary_status().await;
                    if alive {
                        tracing::info!(epoch = view.epoch, "[watch] primary {} is up", view.primary);
                    } else {
                        tracing::warn!(epoch = view.epoch, "[watch] primary {} is down", view.primary);
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
