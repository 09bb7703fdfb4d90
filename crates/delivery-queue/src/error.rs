//! Delivery queue error types.

use thiserror::Error;

/// Key/value store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Queue error type.
#[derive(Error, Debug)]
pub enum QueueError {
    /// An entry with the same context id is already queued
    #[error("Context {0} is already queued")]
    Duplicate(String),

    /// Entry has used up its delivery attempts
    #[error("Context {id} exceeded max attempts ({attempts} > {max_attempts})")]
    AttemptsExceeded {
        id: String,
        attempts: u32,
        max_attempts: u32,
    },

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;

/// Transport error type.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a status worth retrying (5xx, 429)
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Server refused the payload; retrying will not help
    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Send error
    #[error("Send failed: {0}")]
    Send(String),
}

impl TransportError {
    /// Whether the same payload may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. } | TransportError::Json(_))
    }
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
