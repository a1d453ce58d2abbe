//! Lookups against the events database.

mod postgres;

pub use postgres::PgDirectory;

use crate::error::NotificationResult;
use crate::models::{CategoryId, EventId, EventSnapshot, UserContact, UserId};
use async_trait::async_trait;

/// Finds who should hear about an event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    /// Users subscribed to any of `category_ids`, without duplicates
    async fn subscribers_of(&self, category_ids: &[CategoryId]) -> NotificationResult<Vec<UserId>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> NotificationResult<Option<UserContact>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// `None` once the event has been deleted
    async fn find_event(&self, id: EventId) -> NotificationResult<Option<EventSnapshot>>;
}
