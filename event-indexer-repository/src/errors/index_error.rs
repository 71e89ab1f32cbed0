//! Index error types.
//!
//! This module defines the unified error type for all indexing operations. Every
//! variant is classified as either transient (worth retrying) or permanent (the
//! engine will never accept this request). The classification lives here because
//! only this layer knows what the engine's status codes mean; callers decide what
//! to do with it.

use thiserror::Error;

/// Retry classification of an [`IndexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorKind {
    /// Network failure, timeout, throttling or server-side error.
    Transient,
    /// The engine rejected the request as structurally invalid.
    Permanent,
}

/// Unified errors from indexing operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexError {
    /// Validation error (e.g., empty or oversized document id).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to reach the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete within its time budget.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The engine is throttling requests.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Version conflict reported by the engine.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The engine failed to serve the request.
    #[error("Server error (status {status}): {body}")]
    ServerError { status: u16, body: String },

    /// The engine refused the request.
    #[error("Request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Failed to create the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to parse response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search engine.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl IndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Map an unsuccessful HTTP status from the engine to an error.
    ///
    /// 408, 429, 409 and 5xx are transient. Every other status is a rejection.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            408 => Self::Timeout(body),
            409 => Self::Conflict(body),
            429 => Self::RateLimited(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::Rejected { status, body },
        }
    }

    /// Retry classification of this error.
    pub fn kind(&self) -> IndexErrorKind {
        match self {
            Self::ConnectionError(_)
            | Self::Timeout(_)
            | Self::RateLimited(_)
            | Self::Conflict(_)
            | Self::ServerError { .. }
            | Self::ParseError(_) => IndexErrorKind::Transient,
            Self::ValidationError(_)
            | Self::Rejected { .. }
            | Self::IndexCreationError(_)
            | Self::SerializationError(_) => IndexErrorKind::Permanent,
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == IndexErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_transient() {
        for status in [408, 409, 429, 500, 502, 503, 504] {
            let err = IndexError::from_status(status, "body");
            assert!(err.is_transient(), "status {} should be transient", status);
        }
    }

    #[test]
    fn test_from_status_permanent() {
        for status in [400, 401, 403, 413] {
            let err = IndexError::from_status(status, "body");
            assert_eq!(err.kind(), IndexErrorKind::Permanent, "status {}", status);
            assert!(matches!(err, IndexError::Rejected { .. }));
        }
    }

    #[test]
    fn test_transport_errors_are_transient() {
        assert!(IndexError::connection("refused").is_transient());
        assert!(IndexError::timeout("5s").is_transient());
        assert!(IndexError::parse("bad json").is_transient());
    }

    #[test]
    fn test_client_side_errors_are_permanent() {
        assert!(!IndexError::validation("empty id").is_transient());
        assert!(!IndexError::serialization("nan").is_transient());
    }

    #[test]
    fn test_display() {
        let err = IndexError::from_status(503, "unavailable");
        assert_eq!(err.to_string(), "Server error (status 503): unavailable");
    }
}
