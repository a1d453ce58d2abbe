use super::push_all;
use crate::directory::RecipientResolver;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{dedup_recipients, NewEventPayload};
use crate::providers::PushProvider;
use crate::templates::TemplateEngine;
use async_trait::async_trait;
use job_queue::{HandlerError, Job, JobHandler};
use std::sync::Arc;
use tracing::{debug, info};

/// Pushes "New Event" to every user subscribed to the event's categories
pub struct NewEventHandler {
    recipients: Arc<dyn RecipientResolver>,
    push: Arc<dyn PushProvider>,
    templates: TemplateEngine,
}

impl NewEventHandler {
    pub fn new(
        recipients: Arc<dyn RecipientResolver>,
        push: Arc<dyn PushProvider>,
        templates: TemplateEngine,
    ) -> Self {
        Self {
            recipients,
            push,
            templates,
        }
    }

    /// Returns how many users were notified
    pub async fn notify(&self, payload: &NewEventPayload) -> NotificationResult<usize> {
        let recipients = match &payload.recipients {
            Some(explicit) => dedup_recipients(explicit.iter().copied()),
            None => dedup_recipients(
                self.recipients
                    .subscribers_of(&payload.event.category_ids)
                    .await?,
            ),
        };

        if recipients.is_empty() {
            debug!(event_id = payload.event.id, "No subscribers for new event");
            return Ok(0);
        }

        let message = self.templates.render_new_event_push(&payload.event)?;
        let report = push_all(self.push.as_ref(), &recipients, &message).await?;

        info!(
            event_id = payload.event.id,
            recipients = report.delivered.len(),
            provider = self.push.name(),
            "New event pushed"
        );
        Ok(report.delivered.len())
    }
}

#[async_trait]
impl JobHandler for NewEventHandler {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: NewEventPayload = job
            .payload_as()
            .map_err(NotificationError::from)?;
        self.notify(&payload).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "new_event"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MockRecipientResolver;
    use crate::handlers::test_support::job;
    use crate::kind::NotificationKind;
    use crate::models::DeliveryReport;
    use crate::providers::MockPushProvider;
    use serde_json::json;

    fn event_payload(recipients: Option<Vec<i64>>) -> serde_json::Value {
        let mut payload = json!({
            "event": {
                "id": 42,
                "title": "Jazz Night",
                "date_time": "2026-11-01T20:00:00Z",
                "category_ids": [1, 2]
            }
        });
        if let Some(recipients) = recipients {
            payload["recipients"] = json!(recipients);
        }
        payload
    }

    fn handler(resolver: MockRecipientResolver, push: MockPushProvider) -> NewEventHandler {
        NewEventHandler::new(
            Arc::new(resolver),
            Arc::new(push),
            TemplateEngine::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_resolves_and_dedups_subscribers() {
        let mut resolver = MockRecipientResolver::new();
        resolver
            .expect_subscribers_of()
            .withf(|categories| categories.to_vec() == vec![1, 2])
            .times(1)
            .returning(|_| Ok(vec![9, 3, 9]));

        let mut push = MockPushProvider::new();
        push.expect_send()
            .withf(|recipients, message| {
                recipients.to_vec() == vec![3, 9]
                    && message.title == "New Event"
                    && message.body == "Jazz Night"
            })
            .times(1)
            .returning(|recipients, _| Ok(DeliveryReport::all_delivered(recipients)));
        push.expect_name().return_const("mock");

        let job = job(NotificationKind::NewEvent, event_payload(None));
        handler(resolver, push).handle(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_recipients_skip_resolution() {
        let mut resolver = MockRecipientResolver::new();
        resolver.expect_subscribers_of().never();

        let mut push = MockPushProvider::new();
        push.expect_send()
            .withf(|recipients, _| recipients.to_vec() == vec![5])
            .times(1)
            .returning(|recipients, _| Ok(DeliveryReport::all_delivered(recipients)));
        push.expect_name().return_const("mock");

        let job = job(NotificationKind::NewEvent, event_payload(Some(vec![5, 5])));
        handler(resolver, push).handle(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_subscribers_succeeds_without_push() {
        let mut resolver = MockRecipientResolver::new();
        resolver.expect_subscribers_of().returning(|_| Ok(Vec::new()));
        let mut push = MockPushProvider::new();
        push.expect_send().never();

        let payload: NewEventPayload = serde_json::from_value(event_payload(None)).unwrap();
        let notified = handler(resolver, push).notify(&payload).await.unwrap();
        assert_eq!(notified, 0);
    }

    #[tokio::test]
    async fn test_one_rejected_recipient_fails_job() {
        let mut resolver = MockRecipientResolver::new();
        resolver.expect_subscribers_of().returning(|_| Ok(vec![1, 2]));
        let mut push = MockPushProvider::new();
        push.expect_send().returning(|_, _| {
            Ok(DeliveryReport {
                delivered: vec![1],
                failed: vec![(2, "token expired".into())],
            })
        });

        let job = job(NotificationKind::NewEvent, event_payload(None));
        let err = handler(resolver, push).handle(&job).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_permanent() {
        let job = job(NotificationKind::NewEvent, json!({"title": "no event"}));
        let err = handler(MockRecipientResolver::new(), MockPushProvider::new())
            .handle(&job)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
