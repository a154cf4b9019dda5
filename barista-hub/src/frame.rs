use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound frame written to live connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Channel(ChannelFrame),
    Feed(FeedFrame),
}

/// `{ "channel": "orders:<store>", "event": "...", "data": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub channel: String,
    pub event: String,
    pub data: Value,
}

/// `{ "type": "...", "payload": ... }` used by the order-feed subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedFrame {
    InitialData(Value),
    OrderSucceeded(Value),
    OrderUpdated(Value),
    OrderDeleted(Value),
}

impl Frame {
    pub fn channel(channel: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Frame::Channel(ChannelFrame {
            channel: channel.into(),
            event: event.into(),
            data,
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<FeedFrame> for Frame {
    fn from(frame: FeedFrame) -> Self {
        Frame::Feed(frame)
    }
}
