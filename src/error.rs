//! Application error types for authgate
//!
//! This module defines the error types used throughout the service.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Authentication and session errors surfaced to callers
///
/// Every variant is scoped to a single request; none of them is fatal
/// to the process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Too many recent failed logins for this identity
    #[error("Rate limited: too many failed login attempts")]
    RateLimited,

    /// Unknown email or wrong password (never distinguished)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Malformed, expired, or badly signed token
    #[error("Invalid token")]
    TokenInvalid,

    /// Structurally valid token that was superseded or logged out
    #[error("Token has been revoked")]
    TokenRevoked,

    /// Key-value store or user directory unreachable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Token signing failed
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Key-value store errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The store did not answer within the configured command timeout
    #[error("Store operation timed out")]
    Timeout,

    /// Connection-level failure talking to the store
    #[error("Store connection error: {0}")]
    Connection(String),

    /// A stored value could not be decoded
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

/// User directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// SQLite error
    #[error("Directory error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Background connection error
    #[error("Directory connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    /// Stored record could not be decoded
    #[error("Directory serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::ServiceUnavailable(err.to_string())
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::ServiceUnavailable(err.to_string())
    }
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout => true,
            StoreError::Connection(_) => true,
            StoreError::Serialization(_) => false,
        }
    }
}
