// Raw collaborator failures, before classification

use std::time::Duration;
use thiserror::Error;

/// Failure reported by the REST collaborator
///
/// These carry the server's text verbatim; `ErrorClassifier` decides what they mean.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// 2xx response whose envelope reported `success: false`
    #[error("server rejected the request: {message}")]
    Rejected { message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ApiError::Rejected {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        ApiError::Timeout {
            operation: operation.into(),
            duration_ms: after.as_millis() as u64,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server (or transport) text, untouched
    pub fn raw_message(&self) -> String {
        match self {
            ApiError::Http { message, .. } | ApiError::Rejected { message } => message.clone(),
            ApiError::Network(message) | ApiError::Decode(message) => message.clone(),
            ApiError::Timeout { .. } => self.to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }
}

/// Convert a transport error; `operation` and `timeout` describe the call in flight
pub fn from_transport(err: reqwest::Error, operation: &str, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::timeout(operation, timeout)
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        ApiError::http(status.as_u16(), err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}
