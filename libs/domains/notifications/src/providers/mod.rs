//! Delivery provider implementations.
//!
//! Email goes through an [`EmailProvider`], pushes through a
//! [`PushProvider`]. Each has a network-backed implementation and a logging
//! one for local development.

mod log;
mod push_gateway;
mod smtp;

pub use log::{LogEmailProvider, LogPushProvider};
pub use push_gateway::{PushGatewayConfig, PushGatewayProvider};
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::error::NotificationResult;
use crate::models::{DeliveryReport, PushMessage, UserId};
use async_trait::async_trait;

/// Represents a sent email with provider-specific message ID.
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
    /// Whether the email was accepted for delivery.
    pub accepted: bool,
}

/// Email content ready for sending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailContent {
    /// Recipient email address.
    pub to_email: String,
    /// Subject line.
    pub subject: String,
    /// HTML body content.
    pub html_body: String,
    /// Plain text body content.
    pub text_body: String,
}

/// Trait for email sending providers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider is reachable.
    async fn health_check(&self) -> NotificationResult<bool>;
}

/// Trait for push notification providers.
///
/// A transport-level failure is an `Err`; per-recipient rejections are
/// reported in the [`DeliveryReport`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(
        &self,
        recipients: &[UserId],
        message: &PushMessage,
    ) -> NotificationResult<DeliveryReport>;

    fn name(&self) -> &'static str;
}
