use job_queue::JobKind;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Notification job kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Push to everyone subscribed to the event's categories
    NewEvent,
    /// Email a user shortly before an event starts
    EventReminder,
    /// Push a free-form title/body to explicit recipients
    GenericNotification,
}

impl NotificationKind {
    /// Map a channel message `type` to a kind; anything unrecognized is generic
    pub fn from_message_type(message_type: &str) -> Self {
        message_type
            .parse()
            .unwrap_or(NotificationKind::GenericNotification)
    }
}

impl JobKind for NotificationKind {
    fn all() -> Vec<Self> {
        Self::iter().collect()
    }
}
