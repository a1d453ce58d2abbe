//! Immediate, best-effort notifications straight off the events channel.
//!
//! Whatever arrives while the notifier is subscribed is pushed at once. A
//! failure is logged and dropped: durable delivery is the queue's job.

use crate::error::{NotificationError, NotificationResult};
use crate::handlers::NewEventHandler;
use crate::kind::NotificationKind;
use crate::models::NewEventPayload;
use futures::StreamExt;
use job_queue::{ChannelMessage, PubSubRelay};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct LiveNotifier {
    relay: Arc<dyn PubSubRelay>,
    handler: NewEventHandler,
    channel: String,
}

impl LiveNotifier {
    pub fn new(
        relay: Arc<dyn PubSubRelay>,
        handler: NewEventHandler,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            relay,
            handler,
            channel: channel.into(),
        }
    }

    /// Push for one message; returns how many users were notified
    pub async fn handle_message(&self, message: &ChannelMessage) -> NotificationResult<usize> {
        match NotificationKind::from_message_type(&message.message_type) {
            NotificationKind::NewEvent => {
                let payload: NewEventPayload = serde_json::from_value(message.data.clone())?;
                self.handler.notify(&payload).await
            }
            _ => {
                debug!(message_type = %message.message_type, "Ignoring message on live channel");
                Ok(0)
            }
        }
    }

    /// Consume the channel until `shutdown` flips or the subscription ends
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> NotificationResult<()> {
        let mut messages = self.relay.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "Live notifier subscribed");

        loop {
            tokio::select! {
                _ = stop_signalled(&mut shutdown) => break,
                message = messages.next() => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_message(&message).await {
                            log_failure(&message, &e);
                        }
                    }
                    None => {
                        warn!(channel = %self.channel, "Live subscription ended");
                        break;
                    }
                },
            }
        }

        info!(channel = %self.channel, "Live notifier stopped");
        Ok(())
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
///
/// The borrowed value is dropped here so the `run` future stays `Send`.
async fn stop_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn log_failure(message: &ChannelMessage, error: &NotificationError) {
    warn!(
        message_type = %message.message_type,
        error = %error,
        "Live notification failed, not retried"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MockRecipientResolver;
    use crate::models::{DeliveryReport, PushMessage, UserId};
    use crate::providers::{MockPushProvider, PushProvider};
    use crate::templates::TemplateEngine;
    use async_trait::async_trait;
    use job_queue::LocalRelay;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Forwards every push to a channel the test can await
    struct RecordingPush(mpsc::UnboundedSender<(Vec<UserId>, PushMessage)>);

    #[async_trait]
    impl PushProvider for RecordingPush {
        async fn send(
            &self,
            recipients: &[UserId],
            message: &PushMessage,
        ) -> NotificationResult<DeliveryReport> {
            let _ = self.0.send((recipients.to_vec(), message.clone()));
            Ok(DeliveryReport::all_delivered(recipients))
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn new_event_message() -> ChannelMessage {
        ChannelMessage::new(
            "NEW_EVENT",
            json!({
                "event": {
                    "id": 42,
                    "title": "Jazz Night",
                    "date_time": "2026-11-01T20:00:00Z",
                    "category_ids": [4]
                }
            }),
        )
    }

    fn resolver() -> MockRecipientResolver {
        let mut resolver = MockRecipientResolver::new();
        resolver.expect_subscribers_of().returning(|_| Ok(vec![2, 2, 1]));
        resolver
    }

    fn notifier(relay: Arc<dyn PubSubRelay>, push: Arc<dyn PushProvider>) -> LiveNotifier {
        let handler = NewEventHandler::new(Arc::new(resolver()), push, TemplateEngine::new().unwrap());
        LiveNotifier::new(relay, handler, "events")
    }

    #[tokio::test]
    async fn test_other_message_types_are_ignored() {
        let mut push = MockPushProvider::new();
        push.expect_send().never();
        let notifier = notifier(Arc::new(LocalRelay::default()), Arc::new(push));

        let notified = notifier
            .handle_message(&ChannelMessage::new("EVENT_UPDATED", json!({})))
            .await
            .unwrap();
        assert_eq!(notified, 0);
    }

    #[tokio::test]
    async fn test_malformed_new_event_is_an_error() {
        let notifier = notifier(
            Arc::new(LocalRelay::default()),
            Arc::new(MockPushProvider::new()),
        );

        let err = notifier
            .handle_message(&ChannelMessage::new("NEW_EVENT", json!({"id": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_run_pushes_published_events_until_shutdown() {
        let relay = Arc::new(LocalRelay::default());
        let (pushed_tx, mut pushed_rx) = mpsc::unbounded_channel();
        let notifier = notifier(relay.clone(), Arc::new(RecordingPush(pushed_tx)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(notifier.run(shutdown_rx));
        while relay.subscriber_count("events").await == 0 {
            tokio::task::yield_now().await;
        }

        let receivers = relay.publish("events", &new_event_message()).await.unwrap();
        assert_eq!(receivers, 1);

        let (recipients, message) = tokio::time::timeout(Duration::from_secs(5), pushed_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipients, vec![1, 2]);
        assert_eq!(message.title, "New Event");
        assert_eq!(message.body, "Jazz Night");

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_is_send_and_stops_on_shutdown() {
        let notifier = notifier(
            Arc::new(LocalRelay::default()),
            Arc::new(MockPushProvider::new()),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run = notifier.run(shutdown_rx);
        assert_send(&run);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_push_is_not_retried() {
        let relay = Arc::new(LocalRelay::default());
        let mut push = MockPushProvider::new();
        push.expect_send()
            .times(1)
            .returning(|_, _| Err(NotificationError::ProviderError("gateway down".into())));
        let notifier = notifier(relay.clone(), Arc::new(push));

        let err = notifier.handle_message(&new_event_message()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
