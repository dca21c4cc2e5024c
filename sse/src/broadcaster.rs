use crate::registry::{Rejection, SubscriberId, SubscriberRegistry};
use bytes::Bytes;
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of each subscriber's delivery queue.
pub const DELIVERY_QUEUE_CAPACITY: usize = 100;

/// Fans serialized messages out to every live subscriber.
///
/// Delivery is best effort. A push never waits: a subscriber whose queue is
/// full (or already closed) is evicted on a separately spawned task, so one
/// stalled client neither slows the caller nor delays anyone else.
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_queue_capacity(DELIVERY_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            registry: Arc::new(SubscriberRegistry::new()),
            queue_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Create a delivery queue for a new subscriber and register it.
    pub fn register_subscriber(&self) -> (SubscriberId, mpsc::Receiver<Bytes>) {
        let (queue, receiver) = mpsc::channel(self.queue_capacity);

        // Ids are strictly increasing, so a clash means an id was minted
        // outside of `generate`; just draw again.
        let mut id = SubscriberId::generate();
        while !self.registry.add(id.clone(), queue.clone()) {
            id = SubscriberId::generate();
        }

        info!(
            "Registered SSE subscriber {id} ({} connected)",
            self.registry.len()
        );
        (id, receiver)
    }

    pub fn unregister_subscriber(&self, id: &SubscriberId) {
        if self.registry.remove(id) {
            info!(
                "Unregistered SSE subscriber {id} ({} connected)",
                self.registry.len()
            );
        }
    }

    /// Offer `message` to every registered subscriber. Returns how many
    /// queues accepted it.
    ///
    /// Messages from consecutive calls land in each subscriber's queue in call
    /// order. Must be called from within a tokio runtime, since evictions are
    /// spawned.
    pub fn broadcast(&self, message: Bytes) -> usize {
        let offer = self.registry.offer_all(&message);

        for (id, reason) in &offer.rejected {
            match reason {
                Rejection::Full => warn!("Subscriber {id} is not keeping up, evicting"),
                Rejection::Closed => debug!("Subscriber {id} has gone away, evicting"),
            }
            self.evict(id.clone());
        }

        offer.delivered
    }

    fn evict(&self, id: SubscriberId) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            if registry.remove(&id) {
                info!("Evicted SSE subscriber {id}");
            }
        });
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_until_removed(broadcaster: &Broadcaster, id: &SubscriberId) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while broadcaster.registry().contains(id) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber was not evicted");
    }

    #[tokio::test]
    async fn each_subscriber_receives_broadcasts_in_call_order() {
        let broadcaster = Broadcaster::new();
        let (_a, mut a_rx) = broadcaster.register_subscriber();
        let (_b, mut b_rx) = broadcaster.register_subscriber();

        for n in 0..10 {
            assert_eq!(broadcaster.broadcast(Bytes::from(format!("m{n}"))), 2);
        }

        for rx in [&mut a_rx, &mut b_rx] {
            for n in 0..10 {
                assert_eq!(rx.recv().await.unwrap(), Bytes::from(format!("m{n}")));
            }
        }
    }

    #[tokio::test]
    async fn full_subscriber_is_evicted_without_affecting_others() {
        let broadcaster = Broadcaster::with_queue_capacity(2);
        let (healthy, mut healthy_rx) = broadcaster.register_subscriber();
        let (stalled, mut stalled_rx) = broadcaster.register_subscriber();

        broadcaster.broadcast(Bytes::from_static(b"one"));
        broadcaster.broadcast(Bytes::from_static(b"two"));
        // Drain the healthy subscriber only; the stalled one is now full.
        assert_eq!(healthy_rx.recv().await.unwrap(), "one");
        assert_eq!(healthy_rx.recv().await.unwrap(), "two");

        let delivered = broadcaster.broadcast(Bytes::from_static(b"three"));

        assert_eq!(delivered, 1);
        assert_eq!(healthy_rx.recv().await.unwrap(), "three");

        wait_until_removed(&broadcaster, &stalled).await;
        assert!(broadcaster.registry().contains(&healthy));

        broadcaster.broadcast(Bytes::from_static(b"four"));
        assert_eq!(healthy_rx.recv().await.unwrap(), "four");

        // The stalled subscriber keeps its backlog and then sees its queue close.
        assert_eq!(stalled_rx.recv().await.unwrap(), "one");
        assert_eq!(stalled_rx.recv().await.unwrap(), "two");
        assert!(stalled_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscriber_whose_stream_is_gone_is_evicted() {
        let broadcaster = Broadcaster::new();
        let (gone, gone_rx) = broadcaster.register_subscriber();
        drop(gone_rx);

        assert_eq!(broadcaster.broadcast(Bytes::from_static(b"hello")), 0);

        wait_until_removed(&broadcaster, &gone).await;
    }

    #[tokio::test]
    async fn unregistering_an_evicted_subscriber_is_harmless() {
        let broadcaster = Broadcaster::with_queue_capacity(1);
        let (id, _rx) = broadcaster.register_subscriber();

        broadcaster.broadcast(Bytes::from_static(b"fills the queue"));
        broadcaster.broadcast(Bytes::from_static(b"overflows"));
        broadcaster.unregister_subscriber(&id);
        wait_until_removed(&broadcaster, &id).await;
        broadcaster.unregister_subscriber(&id);

        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_delivers_nothing() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.broadcast(Bytes::from_static(b"nobody")), 0);
    }
}
