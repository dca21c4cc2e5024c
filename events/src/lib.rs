//! Change-event infrastructure for the agent timeline.
//!
//! This crate sits between the upstream notification source and whatever
//! reacts to new posts (the SSE broadcaster, in practice). It has no
//! dependencies on the other internal crates, so both the `listener` and the
//! `sse` crates can build on it without cycles.
//!
//! # Architecture
//!
//! - **RawNotification**: a `(channel, payload)` pair as delivered upstream
//! - **ChangeEvent**: the structured record decoded from a payload
//! - **decode**: pure payload-to-event conversion
//! - **EventHandler**: trait for reacting to decoded events
//! - **HandlerRegistry**: channel name to ordered handlers

pub mod change_event;
pub mod error;
pub mod handler;

pub use change_event::{decode, ChangeEvent, RawNotification, TIMELINE_POSTS_CHANNEL};
pub use error::{Error, EventErrorKind};
pub use handler::{EventHandler, HandlerRegistry};
