use crate::common::{Error, Result, SubmitAccepted, SubmitRejected, TransactionRecord};
use std::time::Duration;

/// Result of submitting a write through the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(SubmitAccepted),
    /// The primary was down; retry after failover.
    Unavailable(SubmitRejected),
    /// The forward itself failed.
    Failed(SubmitRejected),
}

/// Client-facing submission API.
pub struct RouterClient {
    client: reqwest::Client,
    base_url: String,
}

impl RouterClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn submit(&self, record: &TransactionRecord) -> Result<SubmitOutcome> {
        let response = self
            .client
            .post(format!("{}/record", self.base_url))
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(SubmitOutcome::Accepted(response.json().await?));
        }
        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("router rejected request: {}", body)));
        }

        let rejected: SubmitRejected = response.json().await?;
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            Ok(SubmitOutcome::Unavailable(rejected))
        } else {
            Ok(SubmitOutcome::Failed(rejected))
        }
    }

    /// Router status document (`GET /`).
    pub async fn status(&self) -> Result<serde_json::Value> {
        let response = self.client.get(&self.base_url).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }
}
