//! Error types for custody

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Coordination Errors ===
    #[error("Probe failed for {node}: {reason}")]
    ProbeFailed { node: String, reason: String },

    #[error("Primary {node} is down. Please wait for failover.")]
    PrimaryUnavailable { node: String },

    #[error("Forward to {node} failed: {reason}")]
    ForwardFailed { node: String, reason: String },

    #[error("Replication to {node} failed: {reason}")]
    ReplicationFailed { node: String, reason: String },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Primary pointer error: {0}")]
    Pointer(String),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::ConnectionFailed(_) | Error::PrimaryUnavailable { .. }
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::PrimaryUnavailable { .. } | Error::UnknownNode(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::ConnectionFailed(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(feature = "sled-backend")]
impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_primary_unavailable_is_retryable_503() {
        let err = Error::PrimaryUnavailable {
            node: "Factory".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("Factory"));
    }

    #[test]
    fn test_forward_failure_is_generic_500() {
        let err = Error::ForwardFailed {
            node: "Factory".into(),
            reason: "connection reset".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_transport_errors_retryable() {
        assert!(Error::Timeout("2s".into()).is_retryable());
        assert!(Error::ConnectionFailed("refused".into()).is_retryable());
        assert!(!Error::Http("500".into()).is_retryable());
    }
}
