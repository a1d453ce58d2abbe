//! Error types for the notifications domain.

use job_queue::{HandlerError, QueueError, RelayError};
use thiserror::Error;

use crate::models::UserId;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Payload does not match the shape its kind expects.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Delivery provider error (SMTP, push gateway).
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Some recipients of a push were rejected; the job is retried in full.
    #[error("Delivery failed for {} of {total} recipients", failed.len())]
    PartialDelivery {
        failed: Vec<(UserId, String)>,
        total: usize,
    },

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Enqueueing or storage error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl NotificationError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            NotificationError::InvalidPayload(_)
                | NotificationError::TemplateError(_)
                | NotificationError::ConfigError(_)
        )
    }
}

impl From<NotificationError> for HandlerError {
    fn from(err: NotificationError) -> Self {
        if err.is_retryable() {
            HandlerError::Retryable(err.to_string())
        } else {
            HandlerError::Permanent(err.to_string())
        }
    }
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::DatabaseError(err.to_string())
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::ProviderError(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::InvalidPayload(err.to_string())
    }
}
