use bytes::Bytes;
use log::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Bounded FIFO of serialized messages feeding one subscriber's stream.
pub type DeliveryQueue = mpsc::Sender<Bytes>;

static LAST_ISSUED_NANOS: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a subscriber (server-generated).
///
/// Derived from the wall clock in nanoseconds, bumped forward whenever two
/// subscribers would land on the same tick, so ids are strictly increasing
/// for the life of the process and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();

        let previous = LAST_ISSUED_NANOS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);

        Self(now.max(previous + 1).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Why a queue refused a message during [`SubscriberRegistry::offer_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rejection {
    /// The subscriber is not keeping up.
    Full,
    /// The subscriber's stream is gone but it has not unregistered yet.
    Closed,
}

/// Result of one [`SubscriberRegistry::offer_all`] pass, taken under a single
/// read lock.
#[derive(Debug, Default)]
pub struct Offer {
    /// Queues that accepted the message.
    pub delivered: usize,
    /// Subscribers that refused it.
    pub rejected: Vec<(SubscriberId, Rejection)>,
}

/// The set of live subscribers, guarded by a single reader/writer lock.
///
/// Every id in the map has an open delivery queue. Removing an id deletes the
/// entry and drops the registry's sender in the same critical section, so once
/// `remove` returns no broadcast can reach that queue through the registry.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, DeliveryQueue>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber. Returns `false`, leaving the existing entry in
    /// place, if the id is already registered.
    pub fn add(&self, id: SubscriberId, queue: DeliveryQueue) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.contains_key(&id) {
            warn!("Subscriber {id} is already registered");
            return false;
        }
        subscribers.insert(id, queue);
        true
    }

    /// Unregister a subscriber and close its queue. Idempotent: returns
    /// `false` when the id was not (or no longer) registered.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        match subscribers.remove(id) {
            Some(queue) => {
                // Delete first, then close, still under the write lock.
                drop(queue);
                true
            }
            None => false,
        }
    }

    /// Copy of the current `(id, queue)` pairs.
    pub fn snapshot(&self) -> Vec<(SubscriberId, DeliveryQueue)> {
        self.subscribers
            .read()
            .iter()
            .map(|(id, queue)| (id.clone(), queue.clone()))
            .collect()
    }

    /// Offer `message` to every registered queue without blocking, holding the
    /// read lock for the whole pass.
    pub fn offer_all(&self, message: &Bytes) -> Offer {
        let subscribers = self.subscribers.read();
        let mut offer = Offer::default();

        for (id, queue) in subscribers.iter() {
            match queue.try_send(message.clone()) {
                Ok(()) => offer.delivered += 1,
                Err(TrySendError::Full(_)) => offer.rejected.push((id.clone(), Rejection::Full)),
                Err(TrySendError::Closed(_)) => {
                    offer.rejected.push((id.clone(), Rejection::Closed))
                }
            }
        }

        offer
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}
