//! Error types for the job queue
//!
//! Handler errors are categorized to drive the retry state machine:
//! - **Retryable**: temporary failure, retried with exponential backoff
//! - **Permanent**: unrecoverable, the job is marked FAILED at once
//! - **Timeout**: the handler overran the job timeout, treated as retryable

use crate::job::JobId;
use std::time::Duration;
use thiserror::Error;

/// Job store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The job was recovered and possibly reclaimed since this lease was issued
    #[error("Lease lost for job {job_id} (attempt {attempt})")]
    LeaseLost { job_id: JobId, attempt: u32 },

    /// A persisted record could not be decoded
    #[error("Corrupt job record {id}: {details}")]
    Corrupt { id: String, details: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend refused the operation (used by the in-memory store to simulate outages)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, StoreError::LeaseLost { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a failed handler run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Retryable(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        HandlerError::Retryable(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        HandlerError::Permanent(message.into())
    }

    /// Check if this error should go through the retry path
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HandlerError::Permanent(_))
    }

    /// Label used for metrics
    pub fn category(&self) -> &'static str {
        match self {
            HandlerError::Retryable(_) => "retryable",
            HandlerError::Permanent(_) => "permanent",
            HandlerError::Timeout(_) => "timeout",
        }
    }
}

/// Pub/sub relay errors. Only ever logged on the publish path.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Relay closed: {0}")]
    Closed(String),
}

/// Errors surfaced by the producer API and the worker
#[derive(Error, Debug)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Input rejected before anything was enqueued
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown job kind: {0}")]
    UnknownKind(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueueError::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_retry_classification() {
        assert!(HandlerError::retryable("smtp down").is_retryable());
        assert!(HandlerError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!HandlerError::permanent("bad payload").is_retryable());
    }

    #[test]
    fn test_handler_error_categories() {
        assert_eq!(HandlerError::retryable("x").category(), "retryable");
        assert_eq!(HandlerError::permanent("x").category(), "permanent");
        assert_eq!(
            HandlerError::Timeout(Duration::from_millis(5)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_lease_lost_display() {
        let id = JobId::new();
        let err = StoreError::LeaseLost {
            job_id: id,
            attempt: 2,
        };
        assert!(err.is_lease_lost());
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.to_string().contains("attempt 2"));
    }

    #[test]
    fn test_store_error_wraps_into_queue_error() {
        let err: QueueError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, QueueError::Storage(_)));
        assert_eq!(err.to_string(), "Store unavailable: down");
    }
}
