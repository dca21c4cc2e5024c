use crate::message::Message;
use crate::Broadcaster;
use async_trait::async_trait;
use events::{ChangeEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Turns each decoded post insert into a `new_post` message and broadcasts it
/// to every connected subscriber.
pub struct NewPostBroadcastHandler {
    broadcaster: Arc<Broadcaster>,
}

impl NewPostBroadcastHandler {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl EventHandler for NewPostBroadcastHandler {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), events::Error> {
        let frame = Message::from(event).to_bytes().map_err(|e| events::Error {
            source: Some(Box::new(e)),
            error_kind: events::EventErrorKind::Handler(
                "failed to serialize new_post message".to_string(),
            ),
        })?;

        let delivered = self.broadcaster.broadcast(frame);
        debug!(
            "Broadcast post {} from agent {} to {delivered} subscriber(s)",
            event.record_id, event.owner_id
        );
        Ok(())
    }
}
