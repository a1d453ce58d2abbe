//! Producer-side API used by the rest of the application.

use crate::error::{NotificationError, NotificationResult};
use crate::kind::NotificationKind;
use crate::models::{
    EventReminderPayload, EventSnapshot, GenericNotificationPayload, NewEventPayload,
    ReminderEvent, UserId,
};
use chrono::TimeDelta;
use core_config::{env_flag, env_or_default, env_parse, ConfigError, FromEnv};
use job_queue::{ChannelMessage, JobId, JobProducer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    /// Channel new events are announced on.
    pub events_channel: String,
    /// How long before an event its reminder goes out.
    pub reminder_lead: TimeDelta,
    /// Also push new events straight off the channel, outside the queue.
    pub live_notifier: bool,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            events_channel: "events".to_string(),
            reminder_lead: TimeDelta::hours(24),
            live_notifier: false,
        }
    }
}

impl FromEnv for NotificationServiceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let lead_minutes: i64 = env_parse("REMINDER_LEAD_MINUTES", 24 * 60)?;
        if lead_minutes < 0 {
            return Err(ConfigError::Invalid {
                key: "REMINDER_LEAD_MINUTES".to_string(),
                details: "must not be negative".to_string(),
            });
        }

        let reminder_lead =
            TimeDelta::try_minutes(lead_minutes).ok_or_else(|| ConfigError::Invalid {
                key: "REMINDER_LEAD_MINUTES".to_string(),
                details: "out of range".to_string(),
            })?;

        Ok(Self {
            events_channel: env_or_default("EVENTS_CHANNEL", "events"),
            reminder_lead,
            live_notifier: env_flag("LIVE_NOTIFIER_ENABLED", false),
        })
    }
}

/// Service for publishing and scheduling notifications.
#[derive(Clone)]
pub struct NotificationService {
    producer: JobProducer<NotificationKind>,
    config: NotificationServiceConfig,
}

impl NotificationService {
    pub fn new(producer: JobProducer<NotificationKind>, config: NotificationServiceConfig) -> Self {
        Self { producer, config }
    }

    pub fn config(&self) -> &NotificationServiceConfig {
        &self.config
    }

    /// Publish a `{"type": ..., "data": {...}}` message on `topic`.
    ///
    /// The data is queued as a job of the matching kind (unknown types become
    /// generic notifications) and relayed to live subscribers. Data that does
    /// not decode as that kind's payload is rejected before anything is stored.
    pub async fn publish(&self, topic: &str, payload: Value) -> NotificationResult<JobId> {
        let message: ChannelMessage = serde_json::from_value(payload)?;
        let kind = NotificationKind::from_message_type(&message.message_type);
        validate_data(kind, &message.data)?;

        let id = self.producer.publish(topic, kind, message).await?;
        debug!(topic, kind = %kind, job_id = %id, "Notification published");
        Ok(id)
    }

    /// Schedule a reminder for `recipient` to run `delay_ms` from now.
    ///
    /// `event` must carry an event id (`eventId` or `event_id`) and a title.
    /// Negative delays run immediately.
    pub async fn schedule(
        &self,
        recipient: UserId,
        event: Value,
        delay_ms: i64,
    ) -> NotificationResult<JobId> {
        if !event.is_object() {
            return Err(NotificationError::InvalidPayload(
                "reminder event must be a JSON object".to_string(),
            ));
        }
        ReminderEvent::deserialize(&event)?;

        let payload = json!({ "user_id": recipient, "event": event });
        let id = self
            .producer
            .enqueue(
                NotificationKind::EventReminder,
                payload,
                TimeDelta::try_milliseconds(delay_ms.max(0)).unwrap_or(TimeDelta::MAX),
            )
            .await?;

        info!(user_id = recipient, job_id = %id, delay_ms, "Reminder scheduled");
        Ok(id)
    }

    /// Announce a newly created event to its category subscribers
    pub async fn notify_event_created(&self, event: &EventSnapshot) -> NotificationResult<JobId> {
        let data = serde_json::to_value(NewEventPayload {
            event: event.clone(),
            recipients: None,
        })?;
        let message = json!({ "type": NotificationKind::NewEvent.to_string(), "data": data });
        self.publish(&self.config.events_channel, message).await
    }

    /// Schedule the reminder `reminder_lead` ahead of the event start.
    ///
    /// Returns `None` for events that have already started; reminders inside
    /// the lead window go out immediately.
    pub async fn schedule_event_reminder(
        &self,
        user_id: UserId,
        event: &EventSnapshot,
    ) -> NotificationResult<Option<JobId>> {
        let now = self.producer.now();
        if event.date_time <= now {
            debug!(event_id = event.id, user_id, "Event already started, no reminder");
            return Ok(None);
        }

        let remind_at = event
            .date_time
            .checked_sub_signed(self.config.reminder_lead)
            .unwrap_or(now);
        let delay = remind_at.signed_duration_since(now);
        let reminder = serde_json::to_value(ReminderEvent {
            event_id: event.id,
            title: event.title.clone(),
            date_time: Some(event.date_time),
        })?;

        self.schedule(user_id, reminder, delay.num_milliseconds())
            .await
            .map(Some)
    }

    /// Cancel a reminder that has not started running yet
    pub async fn cancel_reminder(&self, job_id: JobId) -> NotificationResult<bool> {
        Ok(self.producer.cancel(job_id).await?)
    }
}

/// Decode `data` as the payload `kind` expects
fn validate_data(kind: NotificationKind, data: &Value) -> NotificationResult<()> {
    match kind {
        NotificationKind::NewEvent => {
            NewEventPayload::deserialize(data)?;
        }
        NotificationKind::EventReminder => {
            EventReminderPayload::deserialize(data)?;
        }
        NotificationKind::GenericNotification => {
            GenericNotificationPayload::deserialize(data)?;
        }
    }
    Ok(())
}
