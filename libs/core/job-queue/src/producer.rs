use crate::clock::Clock;
use crate::error::QueueError;
use crate::job::{JobId, NewJob};
use crate::kind::JobKind;
use crate::metrics;
use crate::relay::{ChannelMessage, PubSubRelay};
use crate::store::JobStore;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Producer side of the queue.
///
/// Enqueueing is durable and synchronous; relaying to live subscribers is
/// best effort and never fails the call.
pub struct JobProducer<K: JobKind> {
    store: Arc<dyn JobStore>,
    relay: Option<Arc<dyn PubSubRelay>>,
    clock: Arc<dyn Clock>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: JobKind> Clone for JobProducer<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            relay: self.relay.clone(),
            clock: self.clock.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: JobKind> JobProducer<K> {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            relay: None,
            clock,
            _kind: PhantomData,
        }
    }

    pub fn with_relay(mut self, relay: Arc<dyn PubSubRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Enqueue `kind` to run after `delay`; negative delays run immediately
    pub async fn enqueue(
        &self,
        kind: K,
        payload: Value,
        delay: TimeDelta,
    ) -> Result<JobId, QueueError> {
        let not_before = self
            .clock
            .now()
            .checked_add_signed(delay.max(TimeDelta::zero()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.enqueue_at(kind, payload, not_before).await
    }

    pub async fn enqueue_at(
        &self,
        kind: K,
        payload: Value,
        not_before: DateTime<Utc>,
    ) -> Result<JobId, QueueError> {
        if !payload.is_object() {
            return Err(QueueError::validation(format!(
                "payload for {kind} must be a JSON object"
            )));
        }

        let id = self
            .store
            .enqueue(NewJob::new(kind, payload, not_before))
            .await
            .inspect_err(|_| metrics::storage_error("enqueue"))?;

        metrics::job_enqueued(&kind.to_string());
        debug!(job_id = %id, kind = %kind, not_before = %not_before, "Job enqueued");
        Ok(id)
    }

    /// Durably enqueue an immediate `kind` job carrying `message.data`, then
    /// relay `message` on `channel`.
    pub async fn publish(
        &self,
        channel: &str,
        kind: K,
        message: ChannelMessage,
    ) -> Result<JobId, QueueError> {
        if channel.trim().is_empty() {
            return Err(QueueError::validation("channel must not be empty"));
        }

        let id = self
            .enqueue(kind, message.data.clone(), TimeDelta::zero())
            .await?;

        if let Some(relay) = &self.relay {
            match relay.publish(channel, &message).await {
                Ok(receivers) => {
                    debug!(channel, job_id = %id, receivers, "Relayed message");
                }
                Err(e) => {
                    metrics::relay_failure(channel);
                    warn!(channel, job_id = %id, error = %e, "Relay publish failed, job remains queued");
                }
            }
        }

        Ok(id)
    }

    /// Drop a job that has not started yet
    pub async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.store.cancel(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RetryPolicy;
    use crate::error::{RelayError, StoreError};
    use crate::job::JobState;
    use crate::registry::test_kind::TestKind;
    use crate::relay::{LocalRelay, MockPubSubRelay};
    use crate::store::{MemoryJobStore, MockJobStore};
    use serde_json::json;

    fn setup() -> (Arc<MemoryJobStore>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryJobStore::new(
            Arc::new(clock.clone()),
            RetryPolicy::default(),
        ));
        (store, clock)
    }

    #[tokio::test]
    async fn test_enqueue_with_delay_is_delayed() {
        let (store, clock) = setup();
        let producer = JobProducer::<TestKind>::new(store.clone(), Arc::new(clock.clone()));

        let id = producer
            .enqueue(TestKind::Greeting, json!({"to": 7}), TimeDelta::hours(24))
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.kind, "GREETING");
        assert_eq!(job.not_before, clock.now() + TimeDelta::hours(24));
    }

    #[tokio::test]
    async fn test_negative_delay_is_clamped() {
        let (store, clock) = setup();
        let producer = JobProducer::<TestKind>::new(store.clone(), Arc::new(clock.clone()));

        let id = producer
            .enqueue(TestKind::Greeting, json!({}), TimeDelta::seconds(-30))
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.not_before, clock.now());
    }

    #[tokio::test]
    async fn test_non_object_payload_rejected() {
        let (store, clock) = setup();
        let producer = JobProducer::<TestKind>::new(store.clone(), Arc::new(clock));

        let err = producer
            .enqueue(TestKind::Greeting, json!([1, 2]), TimeDelta::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_publish_with_no_listeners_still_enqueues() {
        let (store, clock) = setup();
        let producer = JobProducer::<TestKind>::new(store.clone(), Arc::new(clock))
            .with_relay(Arc::new(LocalRelay::default()));

        let id = producer
            .publish(
                "events",
                TestKind::Greeting,
                ChannelMessage::new("GREETING", json!({"id": 1})),
            )
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.payload, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_publish_survives_relay_failure() {
        let (store, clock) = setup();
        let mut relay = MockPubSubRelay::new();
        relay
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(RelayError::Closed("connection reset".into())));

        let producer = JobProducer::<TestKind>::new(store.clone(), Arc::new(clock))
            .with_relay(Arc::new(relay));

        let id = producer
            .publish(
                "events",
                TestKind::Farewell,
                ChannelMessage::new("FAREWELL", json!({})),
            )
            .await
            .unwrap();

        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_channel() {
        let (store, clock) = setup();
        let producer = JobProducer::<TestKind>::new(store.clone(), Arc::new(clock));

        let err = producer
            .publish(" ", TestKind::Greeting, ChannelMessage::new("X", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_storage_error_propagates_and_skips_relay() {
        let mut store = MockJobStore::new();
        store
            .expect_enqueue()
            .returning(|_| Err(StoreError::Unavailable("redis down".into())));
        let mut relay = MockPubSubRelay::new();
        relay.expect_publish().never();

        let producer =
            JobProducer::<TestKind>::new(Arc::new(store), Arc::new(ManualClock::starting_now()))
                .with_relay(Arc::new(relay));

        let err = producer
            .publish("events", TestKind::Greeting, ChannelMessage::new("X", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Storage(StoreError::Unavailable(_))));
    }
}
