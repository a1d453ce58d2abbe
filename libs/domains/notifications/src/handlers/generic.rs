use super::push_all;
use crate::error::NotificationError;
use crate::models::{dedup_recipients, GenericNotificationPayload, PushMessage};
use crate::providers::PushProvider;
use async_trait::async_trait;
use job_queue::{HandlerError, Job, JobHandler};
use std::sync::Arc;
use tracing::info;

/// Pushes a caller-supplied title and body to explicit recipients
pub struct GenericNotificationHandler {
    push: Arc<dyn PushProvider>,
}

impl GenericNotificationHandler {
    pub fn new(push: Arc<dyn PushProvider>) -> Self {
        Self { push }
    }
}

#[async_trait]
impl JobHandler for GenericNotificationHandler {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: GenericNotificationPayload =
            job.payload_as().map_err(NotificationError::from)?;
        let recipients = dedup_recipients(payload.recipients);
        if recipients.is_empty() {
            return Ok(());
        }

        let message = PushMessage {
            title: payload.title,
            body: payload.body,
        };
        let report = push_all(self.push.as_ref(), &recipients, &message).await?;

        info!(job_id = %job.id, recipients = report.delivered.len(), "Notification pushed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "generic_notification"
    }
}
