//! Job handlers for each [`NotificationKind`].

mod event_reminder;
mod generic;
mod new_event;

pub use event_reminder::{EventReminderHandler, ReminderOutcome};
pub use generic::GenericNotificationHandler;
pub use new_event::NewEventHandler;

use crate::directory::{EventDirectory, RecipientResolver, UserDirectory};
use crate::error::{NotificationError, NotificationResult};
use crate::kind::NotificationKind;
use crate::models::{DeliveryReport, PushMessage, UserId};
use crate::providers::{EmailProvider, PushProvider};
use crate::templates::TemplateEngine;
use job_queue::HandlerRegistry;
use std::sync::Arc;

/// Everything the handlers talk to
#[derive(Clone)]
pub struct HandlerDeps {
    pub recipients: Arc<dyn RecipientResolver>,
    pub users: Arc<dyn UserDirectory>,
    pub events: Arc<dyn EventDirectory>,
    pub email: Arc<dyn EmailProvider>,
    pub push: Arc<dyn PushProvider>,
    pub templates: TemplateEngine,
}

impl HandlerDeps {
    pub fn new_event_handler(&self) -> NewEventHandler {
        NewEventHandler::new(self.recipients.clone(), self.push.clone(), self.templates.clone())
    }

    /// Registry with a handler for every kind
    pub fn registry(&self) -> HandlerRegistry<NotificationKind> {
        HandlerRegistry::new()
            .register(NotificationKind::NewEvent, self.new_event_handler())
            .register(
                NotificationKind::EventReminder,
                EventReminderHandler::new(
                    self.users.clone(),
                    self.events.clone(),
                    self.email.clone(),
                    self.templates.clone(),
                ),
            )
            .register(
                NotificationKind::GenericNotification,
                GenericNotificationHandler::new(self.push.clone()),
            )
    }
}

/// Push to every recipient; any rejected recipient fails the whole send
pub(crate) async fn push_all(
    push: &dyn PushProvider,
    recipients: &[UserId],
    message: &PushMessage,
) -> NotificationResult<DeliveryReport> {
    let report = push.send(recipients, message).await?;
    if report.is_complete() {
        Ok(report)
    } else {
        Err(NotificationError::PartialDelivery {
            total: report.total(),
            failed: report.failed,
        })
    }
}
