//! Utility functions for custody

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parse duration string (e.g., "200ms", "3s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| crate::Error::InvalidConfig(format!("missing duration unit: {}", s)))?;
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Current time as an RFC 3339 string
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Liveness of a node as tracked by the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Last probe succeeded
    Alive,
    /// Failing, below the failover threshold
    Suspect,
    /// Reached the failover threshold
    Dead,
}

impl NodeState {
    /// Classify a consecutive-failure count against a threshold.
    pub fn from_failures(failures: u32, threshold: u32) -> Self {
        if failures == 0 {
            NodeState::Alive
        } else if failures < threshold {
            NodeState::Suspect
        } else {
            NodeState::Dead
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeState::Alive)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Alive => write!(f, "alive"),
            NodeState::Suspect => write!(f, "suspect"),
            NodeState::Dead => write!(f, "dead"),
        }
    }
}

/// Resolves once `shutdown` carries `true` or its sender is gone.
pub async fn shutdown_signal(mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Shutdown channel flipped to `true` on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                // Keep the sender alive so receivers do not read this as shutdown
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// Retry with exponential backoff.
///
/// `f` runs at most `max_attempts` times; only errors for which
/// [`crate::Error::is_retryable`] holds are retried. A little jitter is added
/// to each delay so replicas recovering together are not hit in lockstep.
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_attempts: usize,
    initial_delay: Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = initial_delay;

    for attempt in 1..=max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                tracing::warn!(
                    "Retry attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    delay + jitter
                );
                tokio::time::sleep(delay + jitter).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}
