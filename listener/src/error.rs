//! Error types for the upstream listener.
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ListenerErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ListenerErrorKind {
    /// The subscription could not be established (connect or LISTEN failed).
    /// Fatal at startup.
    Connection,
    /// Reading from an established subscription failed. Logged and retried.
    Transport,
    /// `start` was called on a listener that is not stopped.
    AlreadyListening,
}

impl Error {
    pub fn already_listening() -> Self {
        Error {
            source: None,
            error_kind: ListenerErrorKind::AlreadyListening,
        }
    }

    pub fn connection(err: impl StdError + Send + Sync + 'static) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ListenerErrorKind::Connection,
        }
    }

    pub fn transport(err: impl StdError + Send + Sync + 'static) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ListenerErrorKind::Transport,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Listener Error: {:?}: {source}", self.error_kind),
            None => write!(f, "Listener Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
