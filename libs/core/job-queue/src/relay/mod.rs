//! Channel fan-out for immediate, non-durable notifications.
//!
//! Every subscriber attached to a channel when a message is published gets
//! its own copy. Nothing is stored: late subscribers never see earlier
//! messages.

mod local;
mod redis;

pub use self::local::LocalRelay;
pub use self::redis::RedisRelay;

use crate::error::RelayError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message carried on a channel: `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
}

impl ChannelMessage {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }
}

pub type Subscription = BoxStream<'static, ChannelMessage>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PubSubRelay: Send + Sync {
    /// Deliver to current subscribers; returns how many received it
    async fn publish(&self, channel: &str, message: &ChannelMessage) -> Result<usize, RelayError>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_message_wire_format() {
        let message: ChannelMessage =
            serde_json::from_value(json!({"type": "NEW_EVENT", "data": {"id": 1}})).unwrap();
        assert_eq!(message.message_type, "NEW_EVENT");
        assert_eq!(message.data["id"], 1);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "NEW_EVENT");
    }

    #[test]
    fn test_channel_message_data_defaults_to_null() {
        let message: ChannelMessage =
            serde_json::from_value(json!({"type": "PING"})).unwrap();
        assert!(message.data.is_null());
    }
}
