//! Notifications Domain
//!
//! Turns application events into pushes and emails through the job queue.
//!
//! # Kinds
//!
//! - `NEW_EVENT`: push "New Event" to every user subscribed to one of the
//!   event's categories
//! - `EVENT_REMINDER`: email a user ahead of an event; skipped when the
//!   event has since been deleted
//! - `GENERIC_NOTIFICATION`: push a title and body to explicit recipients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ NotificationService │  ← publish / schedule / cancel
//! └──────────┬──────────┘
//!            │ enqueue                 relay (best effort)
//! ┌──────────▼──────────┐            ┌──────────────────┐
//! │      Job store      │            │  events channel  │
//! └──────────┬──────────┘            └────────┬─────────┘
//!            │ claim                          │
//! ┌──────────▼──────────┐            ┌────────▼─────────┐
//! │  Worker + handlers  │            │   LiveNotifier   │
//! └──────────┬──────────┘            └────────┬─────────┘
//!            └───────────────┬────────────────┘
//!                   ┌────────▼────────┐
//!                   │    Providers    │  ← SMTP, push gateway
//!                   └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = NotificationService::new(producer, NotificationServiceConfig::from_env()?);
//! service.schedule(7, json!({"eventId": 42, "title": "Jazz Night"}), 86_400_000).await?;
//! ```

pub mod directory;
pub mod error;
pub mod handlers;
pub mod kind;
pub mod live;
pub mod models;
pub mod providers;
pub mod service;
pub mod templates;

// Re-export commonly used types
pub use directory::{EventDirectory, PgDirectory, RecipientResolver, UserDirectory};
pub use error::{NotificationError, NotificationResult};
pub use handlers::{
    EventReminderHandler, GenericNotificationHandler, HandlerDeps, NewEventHandler,
    ReminderOutcome,
};
pub use kind::NotificationKind;
pub use live::LiveNotifier;
pub use models::{
    DeliveryReport, EventReminderPayload, EventSnapshot, GenericNotificationPayload,
    NewEventPayload, PushMessage, ReminderEvent, UserContact, UserId,
};
pub use providers::{
    EmailProvider, LogEmailProvider, LogPushProvider, PushGatewayConfig, PushGatewayProvider,
    PushProvider, SmtpConfig, SmtpProvider,
};
pub use service::{NotificationService, NotificationServiceConfig};
pub use templates::TemplateEngine;
