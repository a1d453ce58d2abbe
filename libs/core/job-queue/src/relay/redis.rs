use super::{ChannelMessage, PubSubRelay, Subscription};
use crate::error::RelayError;
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::warn;

/// Cross-process relay over Redis PUBLISH/SUBSCRIBE.
///
/// Publishing shares the store's connection manager; every subscription opens
/// a dedicated pub/sub connection from the client.
pub struct RedisRelay {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisRelay {
    pub fn new(client: redis::Client, publisher: ConnectionManager) -> Self {
        Self { client, publisher }
    }
}

#[async_trait]
impl PubSubRelay for RedisRelay {
    async fn publish(&self, channel: &str, message: &ChannelMessage) -> Result<usize, RelayError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, RelayError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let channel = channel.clone();
            async move {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Unreadable pub/sub payload");
                        return None;
                    }
                };
                match serde_json::from_str::<ChannelMessage>(&payload) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Ignoring malformed channel message");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
