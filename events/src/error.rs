//! Error types for the `events` crate.
use std::error::Error as StdError;
use std::fmt;

/// Errors raised while turning an upstream notification into a [`ChangeEvent`]
/// or while a registered handler processes one.
///
/// Neither kind is fatal: the listener logs the error and moves on to the next
/// notification (decode failures) or the next handler (handler failures).
///
/// [`ChangeEvent`]: crate::ChangeEvent
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: EventErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum EventErrorKind {
    /// The notification payload was not a well-formed change event.
    Decode(String),
    /// A registered handler failed to process an event.
    Handler(String),
}

impl Error {
    pub fn decode(reason: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: EventErrorKind::Decode(reason.into()),
        }
    }

    pub fn handler(reason: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: EventErrorKind::Handler(reason.into()),
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self.error_kind, EventErrorKind::Decode(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            EventErrorKind::Decode(reason) => write!(f, "Event decode error: {reason}")?,
            EventErrorKind::Handler(reason) => write!(f, "Event handler error: {reason}")?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            error_kind: EventErrorKind::Decode("malformed notification payload".to_string()),
            source: Some(Box::new(err)),
        }
    }
}
