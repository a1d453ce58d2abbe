use super::{ChannelMessage, PubSubRelay, Subscription};
use crate::error::RelayError;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// In-process relay: one broadcast channel per logical channel
pub struct LocalRelay {
    channels: RwLock<HashMap<String, broadcast::Sender<ChannelMessage>>>,
    capacity: usize,
}

impl LocalRelay {
    /// `capacity` is how many messages a slow subscriber may lag before it skips ahead
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl PubSubRelay for LocalRelay {
    async fn publish(&self, channel: &str, message: &ChannelMessage) -> Result<usize, RelayError> {
        let channels = self.channels.read().await;
        let Some(sender) = channels.get(channel) else {
            return Ok(0);
        };

        // send only errors when nobody is listening
        Ok(sender.send(message.clone()).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, RelayError> {
        let receiver = {
            let mut channels = self.channels.write().await;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let channel = channel.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(message) => Some(message),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
