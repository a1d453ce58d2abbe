//! Notification template rendering.
//!
//! Email bodies come in an HTML and a plain-text flavor; push texts are
//! plain. Plain templates use triple-stash so nothing gets HTML-escaped.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{EventSnapshot, PushMessage};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    /// HTML body content.
    pub html: String,
    /// Plain text body content.
    pub text: String,
    /// Email subject line.
    pub subject: String,
}

/// Data for the event reminder email.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderEmailData {
    pub event_title: String,
    pub starts_at: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl ReminderEmailData {
    pub fn new(event_title: impl Into<String>, date_time: DateTime<Utc>) -> Self {
        Self {
            event_title: event_title.into(),
            starts_at: format_start(date_time),
            description: None,
            location: None,
        }
    }

    pub fn from_event(event: &EventSnapshot) -> Self {
        Self {
            description: event.description.clone(),
            location: event.location.clone(),
            ..Self::new(event.title.clone(), event.date_time)
        }
    }
}

#[derive(Serialize)]
struct NewEventPushData<'a> {
    event_title: &'a str,
}

/// How event start times appear in notifications.
pub fn format_start(date_time: DateTime<Utc>) -> String {
    date_time.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Template engine for notification texts.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();

        for (name, template) in [
            ("reminder_subject", REMINDER_SUBJECT_TEMPLATE),
            ("reminder_html", REMINDER_HTML_TEMPLATE),
            ("reminder_text", REMINDER_TEXT_TEMPLATE),
            ("new_event_push_body", NEW_EVENT_PUSH_BODY_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| {
                    NotificationError::TemplateError(format!("Failed to register {}: {}", name, e))
                })?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    fn render<T: Serialize>(&self, template_name: &str, data: &T) -> NotificationResult<String> {
        Ok(self.handlebars.render(template_name, data)?)
    }

    /// Render the reminder email sent ahead of an event.
    pub fn render_reminder(&self, data: &ReminderEmailData) -> NotificationResult<RenderedEmail> {
        debug!(event = %data.event_title, "Rendering reminder email");

        Ok(RenderedEmail {
            subject: self.render("reminder_subject", data)?,
            html: self.render("reminder_html", data)?,
            text: self.render("reminder_text", data)?,
        })
    }

    /// Render the push announcing a newly created event.
    pub fn render_new_event_push(&self, event: &EventSnapshot) -> NotificationResult<PushMessage> {
        Ok(PushMessage {
            title: NEW_EVENT_PUSH_TITLE.to_string(),
            body: self.render(
                "new_event_push_body",
                &NewEventPushData {
                    event_title: &event.title,
                },
            )?,
        })
    }
}

// ============================================================================
// Templates
// ============================================================================

const NEW_EVENT_PUSH_TITLE: &str = "New Event";

const NEW_EVENT_PUSH_BODY_TEMPLATE: &str = "{{{event_title}}}";

const REMINDER_SUBJECT_TEMPLATE: &str = "Reminder: {{{event_title}}}";

const REMINDER_TEXT_TEMPLATE: &str = r#"Event starts at {{{starts_at}}}
{{#if location}}
Where: {{{location}}}
{{/if}}
{{#if description}}

{{{description}}}
{{/if}}"#;

const REMINDER_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Reminder: {{event_title}}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px;">
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">{{event_title}}</h1>
        <p style="color: #52525b; font-size: 16px; margin: 0 0 8px 0;">Event starts at {{starts_at}}</p>
        {{#if location}}
        <p style="color: #52525b; font-size: 16px; margin: 0 0 8px 0;">Where: {{location}}</p>
        {{/if}}
        {{#if description}}
        <p style="color: #71717a; font-size: 14px; line-height: 22px; margin: 16px 0 0 0;">{{description}}</p>
        {{/if}}
      </td>
    </tr>
  </table>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn starts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 1, 20, 0, 0).unwrap()
    }

    #[test]
    fn test_render_reminder() {
        let engine = TemplateEngine::new().unwrap();
        let email = engine
            .render_reminder(&ReminderEmailData::new("Jazz Night", starts()))
            .unwrap();

        assert_eq!(email.subject, "Reminder: Jazz Night");
        assert_eq!(email.text.trim(), "Event starts at 2026-11-01 20:00 UTC");
        assert!(email.html.contains("Event starts at 2026-11-01 20:00 UTC"));
    }

    #[test]
    fn test_reminder_text_is_not_html_escaped() {
        let engine = TemplateEngine::new().unwrap();
        let email = engine
            .render_reminder(&ReminderEmailData::new("Rock & Roll", starts()))
            .unwrap();

        assert_eq!(email.subject, "Reminder: Rock & Roll");
        assert!(email.html.contains("Rock &amp; Roll"));
    }

    #[test]
    fn test_reminder_includes_location() {
        let engine = TemplateEngine::new().unwrap();
        let mut data = ReminderEmailData::new("Jazz Night", starts());
        data.location = Some("Blue Note".into());

        let email = engine.render_reminder(&data).unwrap();
        assert!(email.text.contains("Where: Blue Note"));
    }

    #[test]
    fn test_render_new_event_push() {
        let engine = TemplateEngine::new().unwrap();
        let event = EventSnapshot {
            id: 42,
            title: "Jazz Night".into(),
            description: None,
            date_time: starts(),
            category_ids: vec![1],
            location: None,
        };

        let push = engine.render_new_event_push(&event).unwrap();
        assert_eq!(push.title, "New Event");
        assert_eq!(push.body, "Jazz Night");
    }
}
