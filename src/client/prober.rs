use crate::common::{Error, NodeDescriptor, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Liveness check against one node.
///
/// Every failure mode (timeout, refused connection, non-2xx status) is
/// reported the same way, as [`Error::ProbeFailed`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, node: &NodeDescriptor) -> Result<()>;

    async fn is_alive(&self, node: &NodeDescriptor) -> bool {
        self.probe(node).await.is_ok()
    }
}

/// Probes `GET {health_url}` with a short timeout.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, node: &NodeDescriptor) -> Result<()> {
        let response = self
            .client
            .get(&node.health_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::ProbeFailed {
                node: node.name.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::ProbeFailed {
                node: node.name.clone(),
                reason: format!("health endpoint returned {}", response.status()),
            });
        }
        Ok(())
    }
}
