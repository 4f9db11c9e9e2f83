//! Common error types for services

use thiserror::Error;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection failed error
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Service unavailable error
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid request error
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Rate limited error
    #[error("Rate limited: {0}")]
    RateLimited(String),
}
