use crate::directory::{EventDirectory, UserDirectory};
use crate::error::{NotificationError, NotificationResult};
use crate::models::EventReminderPayload;
use crate::providers::{EmailContent, EmailProvider};
use crate::templates::{ReminderEmailData, TemplateEngine};
use async_trait::async_trait;
use job_queue::{HandlerError, Job, JobHandler};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    Sent,
    /// The event was deleted after the reminder was scheduled
    EventGone,
    /// The user was deleted after the reminder was scheduled
    UserGone,
}

/// Emails a user that an event they care about is about to start
pub struct EventReminderHandler {
    users: Arc<dyn UserDirectory>,
    events: Arc<dyn EventDirectory>,
    email: Arc<dyn EmailProvider>,
    templates: TemplateEngine,
}

impl EventReminderHandler {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventDirectory>,
        email: Arc<dyn EmailProvider>,
        templates: TemplateEngine,
    ) -> Self {
        Self {
            users,
            events,
            email,
            templates,
        }
    }

    pub async fn remind(&self, payload: &EventReminderPayload) -> NotificationResult<ReminderOutcome> {
        let event_id = payload.event.event_id;

        let Some(event) = self.events.find_event(event_id).await? else {
            info!(event_id, user_id = payload.user_id, "Event no longer exists, skipping reminder");
            return Ok(ReminderOutcome::EventGone);
        };

        let Some(user) = self.users.find_user(payload.user_id).await? else {
            warn!(event_id, user_id = payload.user_id, "User no longer exists, skipping reminder");
            return Ok(ReminderOutcome::UserGone);
        };

        let rendered = self.templates.render_reminder(&ReminderEmailData::from_event(&event))?;
        let sent = self
            .email
            .send(&EmailContent {
                to_email: user.email.clone(),
                subject: rendered.subject,
                html_body: rendered.html,
                text_body: rendered.text,
            })
            .await?;

        if !sent.accepted {
            return Err(NotificationError::ProviderError(format!(
                "{} did not accept reminder for {}",
                self.email.name(),
                user.email
            )));
        }

        info!(
            event_id,
            user_id = user.id,
            message_id = ?sent.message_id,
            "Reminder sent"
        );
        Ok(ReminderOutcome::Sent)
    }
}

#[async_trait]
impl JobHandler for EventReminderHandler {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: EventReminderPayload = job.payload_as().map_err(NotificationError::from)?;
        self.remind(&payload).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "event_reminder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MockEventDirectory, MockUserDirectory};
    use crate::handlers::test_support::job;
    use crate::kind::NotificationKind;
    use crate::models::{EventSnapshot, UserContact};
    use crate::providers::{MockEmailProvider, SentEmail};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn jazz_night() -> EventSnapshot {
        EventSnapshot {
            id: 42,
            title: "Jazz Night".into(),
            description: None,
            date_time: Utc.with_ymd_and_hms(2026, 11, 1, 20, 0, 0).unwrap(),
            category_ids: vec![1],
            location: None,
        }
    }

    fn ana() -> UserContact {
        UserContact {
            id: 7,
            email: "ana@example.com".into(),
            preferred_language: "en".into(),
        }
    }

    fn reminder_job() -> Job {
        job(
            NotificationKind::EventReminder,
            json!({"user_id": 7, "event": {"eventId": 42, "title": "Jazz Night"}}),
        )
    }

    fn handler(
        users: MockUserDirectory,
        events: MockEventDirectory,
        email: MockEmailProvider,
    ) -> EventReminderHandler {
        EventReminderHandler::new(
            Arc::new(users),
            Arc::new(events),
            Arc::new(email),
            TemplateEngine::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sends_reminder_email() {
        let mut events = MockEventDirectory::new();
        events
            .expect_find_event()
            .withf(|id| *id == 42)
            .returning(|_| Ok(Some(jazz_night())));
        let mut users = MockUserDirectory::new();
        users.expect_find_user().returning(|_| Ok(Some(ana())));
        let mut email = MockEmailProvider::new();
        email
            .expect_send()
            .withf(|content| {
                content.to_email == "ana@example.com"
                    && content.subject == "Reminder: Jazz Night"
                    && content.text_body.contains("Event starts at 2026-11-01 20:00 UTC")
            })
            .times(1)
            .returning(|_| {
                Ok(SentEmail {
                    message_id: Some("abc".into()),
                    accepted: true,
                })
            });

        handler(users, events, email)
            .handle(&reminder_job())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deleted_event_is_skipped() {
        let mut events = MockEventDirectory::new();
        events.expect_find_event().returning(|_| Ok(None));
        let mut users = MockUserDirectory::new();
        users.expect_find_user().never();
        let mut email = MockEmailProvider::new();
        email.expect_send().never();

        let payload: EventReminderPayload =
            serde_json::from_value(reminder_job().payload).unwrap();
        let outcome = handler(users, events, email).remind(&payload).await.unwrap();
        assert_eq!(outcome, ReminderOutcome::EventGone);
    }

    #[tokio::test]
    async fn test_deleted_user_is_skipped() {
        let mut events = MockEventDirectory::new();
        events.expect_find_event().returning(|_| Ok(Some(jazz_night())));
        let mut users = MockUserDirectory::new();
        users.expect_find_user().returning(|_| Ok(None));
        let mut email = MockEmailProvider::new();
        email.expect_send().never();

        let payload: EventReminderPayload =
            serde_json::from_value(reminder_job().payload).unwrap();
        let outcome = handler(users, events, email).remind(&payload).await.unwrap();
        assert_eq!(outcome, ReminderOutcome::UserGone);
    }

    #[tokio::test]
    async fn test_smtp_failure_is_retryable() {
        let mut events = MockEventDirectory::new();
        events.expect_find_event().returning(|_| Ok(Some(jazz_night())));
        let mut users = MockUserDirectory::new();
        users.expect_find_user().returning(|_| Ok(Some(ana())));
        let mut email = MockEmailProvider::new();
        email
            .expect_send()
            .returning(|_| Err(NotificationError::ProviderError("SMTP send failed".into())));

        let err = handler(users, events, email)
            .handle(&reminder_job())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_database_error_is_retryable() {
        let mut events = MockEventDirectory::new();
        events
            .expect_find_event()
            .returning(|_| Err(NotificationError::DatabaseError("connection reset".into())));

        let err = handler(MockUserDirectory::new(), events, MockEmailProvider::new())
            .handle(&reminder_job())
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::Retryable("Database error: connection reset".into()));
    }
}
