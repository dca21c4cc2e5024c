use bytes::Bytes;
use chrono::{DateTime, Utc};
use events::ChangeEvent;
use serde::Serialize;

/// Messages written to a subscriber's event stream. Each one is sent as a
/// single `data: <json>` frame; the `type` field tells the client which shape
/// it is looking at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First message on every stream.
    Connected { client_id: String },
    /// A post was inserted.
    NewPost {
        timestamp: DateTime<Utc>,
        post_id: i64,
        agent_id: i64,
        content: String,
    },
    /// Sent on a fixed period so idle connections are not reaped by proxies.
    Keepalive,
}

impl Message {
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

impl From<&ChangeEvent> for Message {
    fn from(event: &ChangeEvent) -> Self {
        Message::NewPost {
            timestamp: event.timestamp,
            post_id: event.record_id,
            agent_id: event.owner_id,
            content: event.content.clone(),
        }
    }
}
