use crate::common::{
    Error, LedgerData, NodeDescriptor, RecordAck, Result, TransactionRecord,
    REPLICATED_FROM_HEADER,
};
use async_trait::async_trait;
use std::time::Duration;

/// Write/read RPCs of a ledger node.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Append `record` on `node`. `replicated_from` marks a write pushed by a
    /// primary's propagator; the receiving node will not propagate it again.
    async fn record(
        &self,
        node: &NodeDescriptor,
        record: &TransactionRecord,
        replicated_from: Option<&str>,
    ) -> Result<RecordAck>;

    /// Fetch every record stored on `node`.
    async fn ledger(&self, node: &NodeDescriptor) -> Result<LedgerData>;
}

/// [`NodeApi`] over HTTP+JSON.
#[derive(Clone)]
pub struct HttpNodeClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNodeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

async fn check_status(
    node: &NodeDescriptor,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Http(format!(
        "{} returned {}: {}",
        node.name,
        status,
        body.trim()
    )))
}

#[async_trait]
impl NodeApi for HttpNodeClient {
    async fn record(
        &self,
        node: &NodeDescriptor,
        record: &TransactionRecord,
        replicated_from: Option<&str>,
    ) -> Result<RecordAck> {
        let mut request = self
            .client
            .post(node.record_url())
            .timeout(self.timeout)
            .json(record);
        if let Some(source) = replicated_from {
            request = request.header(REPLICATED_FROM_HEADER, source);
        }

        let response = check_status(node, request.send().await?).await?;
        Ok(response.json::<RecordAck>().await?)
    }

    async fn ledger(&self, node: &NodeDescriptor) -> Result<LedgerData> {
        let response = self
            .client
            .get(node.ledger_url())
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(node, response).await?;
        Ok(response.json::<LedgerData>().await?)
    }
}
