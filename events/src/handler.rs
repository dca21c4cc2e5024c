use crate::error::Error;
use crate::ChangeEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use std::sync::Arc;

/// Trait for handling decoded change events.
/// Implementations perform side effects such as broadcasting to live
/// subscribers. Returning an error never stops the listener; it is logged and
/// the next handler still runs.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), Error>;
}

/// Maps a channel name to the ordered list of handlers registered for it.
///
/// Registration is append-only and expected at startup, but it is safe to call
/// while the listener is dispatching: [`HandlerRegistry::handlers_for`] hands
/// out a copy of the list, so a concurrent `register` never changes a list
/// mid-dispatch.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Append a handler to the list for `channel`.
    pub fn register(&self, channel: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let channel = channel.into();
        debug!("Registering event handler on channel {channel}");
        self.handlers.entry(channel).or_default().push(handler);
    }

    /// Snapshot of the handlers for `channel`, in registration order.
    pub fn handlers_for(&self, channel: &str) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .get(channel)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Run every handler for `channel` against `event`, serially and in
    /// registration order. Failures are logged and do not affect siblings.
    /// Returns the number of handlers that failed.
    pub async fn dispatch(&self, channel: &str, event: &ChangeEvent) -> usize {
        let mut failures = 0;
        for handler in self.handlers_for(channel) {
            if let Err(e) = handler.handle(event).await {
                failures += 1;
                error!(
                    "Error in notification handler on channel {channel} for record {}: {e}",
                    event.record_id
                );
            }
        }
        failures
    }
}
