//! Bridge from the database's change notifications to in-process handlers.
//!
//! An [`UpstreamListener`] owns one long-lived subscription (a
//! [`NotificationSource`], normally [`PgNotificationSource`] issuing
//! `LISTEN timeline_posts` on a dedicated connection), decodes each
//! notification into an [`events::ChangeEvent`] and runs the handlers
//! registered in an [`events::HandlerRegistry`] for that channel.
//!
//! Decode failures, handler failures and transient read errors are logged and
//! never end the loop. Only failing to establish the subscription is fatal,
//! and that happens before the listener is started.

pub mod error;
pub mod source;
pub mod upstream;

pub use error::{Error, ListenerErrorKind};
pub use source::{NotificationSource, PgNotificationSource};
pub use upstream::{ListenerStatus, UpstreamListener};
