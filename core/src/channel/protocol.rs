/// Line protocol between channel clients and the hub.
///
/// One JSON object per line, tagged by `op`.
use crate::messenger_types::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HubFrame {
    /// Client → hub: start receiving a channel
    Subscribe { channel: String },
    /// Client → hub: stop receiving a channel
    Unsubscribe { channel: String },
    /// Client → hub: deliver a message to a channel's listeners
    Publish { channel: String, message: Message },
    /// Hub → client: subscription registered
    Subscribed { channel: String },
    /// Hub → client: a message published on a subscribed channel
    Event { channel: String, message: Message },
    /// Hub → client: the last frame was rejected
    Error { reason: String },
}

impl HubFrame {
    /// Serialize to a newline-terminated line
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
