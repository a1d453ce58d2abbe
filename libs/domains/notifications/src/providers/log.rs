//! Providers that only log, for running the worker without SMTP or a push
//! gateway.

use super::{EmailContent, EmailProvider, PushProvider, SentEmail};
use crate::error::NotificationResult;
use crate::models::{DeliveryReport, PushMessage, UserId};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail> {
        info!(
            to = %email.to_email,
            subject = %email.subject,
            body = %email.text_body,
            "Email (log only)"
        );
        Ok(SentEmail {
            message_id: None,
            accepted: true,
        })
    }

    fn name(&self) -> &'static str {
        "Log"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogPushProvider;

#[async_trait]
impl PushProvider for LogPushProvider {
    async fn send(
        &self,
        recipients: &[UserId],
        message: &PushMessage,
    ) -> NotificationResult<DeliveryReport> {
        for user_id in recipients {
            info!(user_id, title = %message.title, body = %message.body, "Push (log only)");
        }
        Ok(DeliveryReport::all_delivered(recipients))
    }

    fn name(&self) -> &'static str {
        "Log"
    }
}
