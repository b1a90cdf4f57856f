//! Error types for Connector Hub.

use thiserror::Error;

/// Result type alias using Connector Hub's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP-style statuses the gateway treats as transient.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Core error type for Connector Hub.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Registration Errors
    // =========================================================================
    #[error("Connector contract violation: {0}")]
    ContractViolation(String),

    #[error("Connector not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    #[error("Rate limit exceeded for {connector}: {limit} requests per {window_ms}ms")]
    RateLimitExceeded {
        connector: String,
        limit: u32,
        window_ms: u64,
    },

    #[error("Authentication failed for {connector}: {message}")]
    AuthenticationFailed { connector: String, message: String },

    #[error("Request failed (status {status:?}): {message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    // =========================================================================
    // Orchestrator Errors
    // =========================================================================
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    #[error("A pipeline is already processing: {0}")]
    PipelineBusy(String),

    #[error("Pipeline cancelled: {0}")]
    PipelineCancelled(String),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a contract violation error.
    pub fn contract_violation(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an authentication error.
    pub fn authentication_failed(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            connector: connector.into(),
            message: msg.into(),
        }
    }

    /// Create a request failure carrying the transport status when known.
    pub fn request_failed(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: msg.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Wrap a stage error with the failing stage's name.
    pub fn stage_failed(stage: impl Into<String>, source: Error) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the gateway's retry policy may re-attempt the call.
    /// Authentication failures are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed {
                status: Some(status),
                ..
            } => RETRYABLE_STATUSES.contains(status),
            Self::Timeout(_) | Self::Network(_) => true,
            _ => false,
        }
    }

    /// Transport status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            Self::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in RETRYABLE_STATUSES {
            assert!(Error::request_failed(Some(status), "boom").is_retryable());
        }
        assert!(!Error::request_failed(Some(404), "missing").is_retryable());
        assert!(!Error::request_failed(None, "unknown").is_retryable());
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(Error::timeout("deadline").is_retryable());
        assert!(Error::network("connection reset").is_retryable());
    }

    #[test]
    fn test_auth_failures_are_not_retryable() {
        assert!(!Error::authentication_failed("github", "bad token").is_retryable());
    }

    #[test]
    fn test_stage_failed_display() {
        let err = Error::stage_failed("build", Error::request_failed(Some(500), "ci down"));
        let rendered = err.to_string();
        assert!(rendered.contains("build"));
        assert!(rendered.contains("500"));
    }
}
