use crate::error::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Channel the post insert trigger publishes on and the listener subscribes to.
pub const TIMELINE_POSTS_CHANNEL: &str = "timeline_posts";

/// A notification exactly as it arrives from the upstream event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub channel: String,
    pub payload: String,
}

impl RawNotification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// A decoded row change, as published by the `timeline_posts` insert trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub table: String,
    pub record_id: i64,
    pub owner_id: i64,
    pub content: String,
}

/// Wire shape of the trigger payload. Field names follow the JSON object built
/// by `json_build_object` in the trigger function.
#[derive(Debug, Deserialize)]
struct NotificationPayload {
    timestamp: f64,
    operation: String,
    table: String,
    post_id: i64,
    agent_id: i64,
    content: String,
}

/// Decodes a raw notification into a [`ChangeEvent`].
///
/// The payload must be a JSON object carrying every field of the event. The
/// `timestamp` is epoch seconds; a fractional part is kept down to the
/// nanosecond, but precision beyond whole seconds depends on what the upstream
/// formatter emitted.
pub fn decode(raw: &RawNotification) -> Result<ChangeEvent, Error> {
    let payload: NotificationPayload = serde_json::from_str(&raw.payload)?;

    Ok(ChangeEvent {
        timestamp: epoch_seconds_to_utc(payload.timestamp)?,
        operation: payload.operation,
        table: payload.table,
        record_id: payload.post_id,
        owner_id: payload.agent_id,
        content: payload.content,
    })
}

fn epoch_seconds_to_utc(epoch_seconds: f64) -> Result<DateTime<Utc>, Error> {
    if !epoch_seconds.is_finite() {
        return Err(Error::decode(format!(
            "timestamp {epoch_seconds} is not a finite number"
        )));
    }

    let whole = epoch_seconds.floor();
    let nanos = ((epoch_seconds - whole) * NANOS_PER_SECOND).round() as u32;
    // Rounding can land exactly on the next second.
    let (secs, nanos) = if nanos >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nanos)
    };

    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| Error::decode(format!("timestamp {epoch_seconds} is out of range")))
}
