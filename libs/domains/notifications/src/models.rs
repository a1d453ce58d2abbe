//! Data models for the notifications domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identifier as stored in the events database.
pub type UserId = i64;

/// Event identifier as stored in the events database.
pub type EventId = i64;

/// Category identifier.
pub type CategoryId = i64;

// ============================================================================
// Job payloads
// ============================================================================

/// The parts of an event a notification needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Event ID.
    pub id: EventId,
    /// Event title.
    pub title: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the event starts.
    pub date_time: DateTime<Utc>,
    /// Categories the event is tagged with.
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    /// Human-readable location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Payload of a `NEW_EVENT` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEventPayload {
    pub event: EventSnapshot,
    /// Explicit recipients; resolved from the event's categories when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<UserId>>,
}

/// Event reference carried by a reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderEvent {
    #[serde(alias = "eventId", alias = "id")]
    pub event_id: EventId,
    pub title: String,
    #[serde(
        default,
        alias = "dateTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_time: Option<DateTime<Utc>>,
}

/// Payload of an `EVENT_REMINDER` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReminderPayload {
    #[serde(alias = "userId")]
    pub user_id: UserId,
    pub event: ReminderEvent,
}

/// Payload of a `GENERIC_NOTIFICATION` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericNotificationPayload {
    pub recipients: Vec<UserId>,
    pub title: String,
    pub body: String,
}

// ============================================================================
// Delivery types
// ============================================================================

/// A push notification addressed to a set of users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

/// Outcome of a push fan-out, per recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<UserId>,
    pub failed: Vec<(UserId, String)>,
}

impl DeliveryReport {
    /// Every recipient was delivered.
    pub fn all_delivered(recipients: &[UserId]) -> Self {
        Self {
            delivered: recipients.to_vec(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Contact details of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContact {
    pub id: UserId,
    pub email: String,
    /// ISO language code, defaults to `en`.
    pub preferred_language: String,
}

/// Dedup and sort a recipient list.
pub fn dedup_recipients(recipients: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
    let mut recipients: Vec<UserId> = recipients.into_iter().collect();
    recipients.sort_unstable();
    recipients.dedup();
    recipients
}
