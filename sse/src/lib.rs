//! Server-Sent Events (SSE) infrastructure for the live timeline.
//!
//! Every viewer that opens the event stream becomes a subscriber with its own
//! bounded delivery queue. New posts arrive from the upstream listener as
//! change events, are turned into `new_post` messages and fanned out to all
//! subscribers.
//!
//! # Architecture
//!
//! - **Registry of subscribers**: one reader/writer lock around an
//!   id-to-queue map; broadcasts take the read side, add/remove the write side.
//! - **Drop-and-evict broadcasting**: a push never blocks. A subscriber whose
//!   queue is full is evicted on a spawned task, so a stalled client cannot
//!   hold up the producer or its peers.
//! - **Ephemeral messages**: nothing is replayed. A client that misses events
//!   reloads posts through the query endpoint.
//! - **Sessions**: each connection streams `connected`, then relayed
//!   broadcasts and periodic `keepalive` frames, and unregisters exactly once
//!   when it ends.
//!
//! # Message Flow
//!
//! 1. A post row is inserted; the database trigger publishes a notification
//! 2. The listener decodes it and runs `NewPostBroadcastHandler`
//! 3. The handler serializes a `new_post` message and calls `Broadcaster::broadcast`
//! 4. Each session pulls the frame from its queue and writes it to its client
//!
//! # Modules
//!
//! - `registry`: `SubscriberRegistry` and `SubscriberId`
//! - `broadcaster`: fan-out with the eviction policy
//! - `session`: per-subscriber stream lifecycle
//! - `message`: outbound message shapes
//! - `post_event_handler`: bridge from change events to broadcasts

pub mod broadcaster;
pub mod message;
pub mod post_event_handler;
pub mod registry;
pub mod session;

pub use broadcaster::Broadcaster;
pub use post_event_handler::NewPostBroadcastHandler;
pub use session::Session;
