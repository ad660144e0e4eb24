//! Ledger node server

use crate::client::{HttpNodeClient, NodeApi};
use crate::common::{shutdown_signal, Error, NodeConfig, NodeRing, ReplicationConfig, Result};
use crate::node::http::{create_health_router, create_router, LedgerState, NodeMetrics};
use crate::node::store::Ledger;
use crate::replication::Propagator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub struct LedgerNode {
    config: NodeConfig,
    ring: NodeRing,
    replication: ReplicationConfig,
}

impl LedgerNode {
    /// `config.name` must be a member of `ring`.
    pub fn new(config: NodeConfig, ring: NodeRing, replication: ReplicationConfig) -> Result<Self> {
        if ring.find(&config.name).is_none() {
            return Err(Error::UnknownNode(config.name.clone()));
        }
        Ok(Self {
            config,
            ring,
            replication,
        })
    }

    /// Bind the configured addresses and serve until shutdown.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let api_listener = TcpListener::bind(self.config.bind_addr).await?;
        let health_listener = TcpListener::bind(self.config.health_addr).await?;
        self.serve_with(api_listener, health_listener, shutdown)
            .await
    }

    /// Serve on already-bound listeners.
    pub async fn serve_with(
        self,
        api_listener: TcpListener,
        health_listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let peers = self.ring.peers_of(&self.config.name);

        tracing::info!("Starting ledger node: {}", self.config.name);
        tracing::info!("  API: {}", api_listener.local_addr()?);
        tracing::info!("  Health: {}", health_listener.local_addr()?);
        tracing::info!("  Consistency: {:?}", self.config.consistency);
        tracing::info!(
            "  Peers: {}",
            peers
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let ledger = Ledger::open(self.config.data_path.as_deref())?;
        let api: Arc<dyn NodeApi> = Arc::new(HttpNodeClient::new(self.replication.request_timeout())?);
        let propagator = Arc::new(Propagator::start(
            self.config.name.clone(),
            peers,
            api,
            self.replication.clone(),
        ));

        let state = LedgerState {
            name: self.config.name.as_str().into(),
            ledger,
            propagator,
            consistency: self.config.consistency,
            metrics: Arc::new(NodeMetrics::default()),
        };

        let api_server = axum::serve(
            api_listener,
            create_router(state, self.config.max_concurrency),
        )
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()));
        let health_server = axum::serve(health_listener, create_health_router())
            .with_graceful_shutdown(shutdown_signal(shutdown));

        tracing::info!("✓ Ledger node {} ready", self.config.name);

        tokio::select! {
            res = api_server => {
                if let Err(e) = res {
                    tracing::error!("API server error: {}", e);
                }
            }
            res = health_server => {
                if let Err(e) = res {
                    tracing::error!("Health server error: {}", e);
                }
            }
        }

        tracing::info!("Ledger node {} stopped", self.config.name);
        Ok(())
    }
}
