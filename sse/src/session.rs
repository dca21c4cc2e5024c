use crate::broadcaster::Broadcaster;
use crate::message::Message;
use crate::registry::{SubscriberId, SubscriberRegistry};
use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// One connected subscriber, from registration until its stream ends.
///
/// [`Session::open`] registers the subscriber right away. The stream returned
/// by [`Session::into_stream`] starts with a `connected` frame, then relays
/// broadcasts and emits a `keepalive` frame every [`KEEPALIVE_INTERVAL`]. It
/// ends when `shutdown` fires or the subscriber is evicted, and unregisters
/// exactly once on every exit path, including the transport dropping the
/// stream mid-flight.
pub struct Session {
    id: SubscriberId,
    receiver: mpsc::Receiver<Bytes>,
    teardown: Teardown,
    keepalive_interval: Duration,
}

enum Step {
    Deliver(Bytes),
    KeepAlive,
    Close,
}

/// Unregisters the subscriber when dropped.
struct Teardown {
    id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.registry.remove(&self.id) {
            info!("SSE subscriber {} disconnected", self.id);
        } else {
            debug!("SSE subscriber {} was already unregistered", self.id);
        }
    }
}

impl Session {
    pub fn open(broadcaster: &Broadcaster) -> Self {
        let (id, receiver) = broadcaster.register_subscriber();
        let teardown = Teardown {
            id: id.clone(),
            registry: Arc::clone(broadcaster.registry()),
        };

        Self {
            id,
            receiver,
            teardown,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }

    pub fn with_keepalive_interval(mut self, keepalive_interval: Duration) -> Self {
        self.keepalive_interval = keepalive_interval;
        self
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Serialized frames for the subscriber's transport, one per message.
    pub fn into_stream(self, shutdown: CancellationToken) -> impl Stream<Item = Bytes> + Send {
        let Session {
            id,
            mut receiver,
            teardown,
            keepalive_interval,
        } = self;

        stream! {
            // Held for the life of the stream; dropping the stream drops it.
            let _teardown = teardown;

            if let Some(frame) = encode(&Message::Connected { client_id: id.to_string() }) {
                yield frame;
            }

            let keepalive_frame = encode(&Message::Keepalive);
            let mut keepalive = interval_at(Instant::now() + keepalive_interval, keepalive_interval);
            keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let step = tokio::select! {
                    _ = shutdown.cancelled() => Step::Close,
                    delivered = receiver.recv() => match delivered {
                        Some(frame) => Step::Deliver(frame),
                        // Evicted: the registry dropped our queue.
                        None => Step::Close,
                    },
                    _ = keepalive.tick() => Step::KeepAlive,
                };

                match step {
                    Step::Deliver(frame) => yield frame,
                    Step::KeepAlive => {
                        if let Some(frame) = keepalive_frame.clone() {
                            yield frame;
                        }
                    }
                    Step::Close => break,
                }
            }

            debug!("SSE session {id} ended");
        }
    }
}

fn encode(message: &Message) -> Option<Bytes> {
    match message.to_bytes() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to serialize SSE message: {e}");
            None
        }
    }
}
