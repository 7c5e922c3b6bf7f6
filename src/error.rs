//! Error taxonomy for the content script.
//!
//! Most of these are expected in the field: the extension context goes away
//! during updates, the popup is usually closed, and host pages re-render
//! underneath us. `is_silent` tells callers which ones to swallow.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RailError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RailError {
    /// Extension runtime vanished (reload/update); nothing to recover.
    #[error("extension context invalidated")]
    ContextInvalidated,

    /// Outbound message had no receiver (popup closed).
    #[error("no listener for outbound message")]
    NoListener,

    /// A tracked node left the document between discovery and use.
    #[error("node detached from document")]
    Detached,

    #[error("store error: {0}")]
    Store(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("dom error: {0}")]
    Dom(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl RailError {
    /// Expected outcomes that must never surface beyond a debug log.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            RailError::ContextInvalidated | RailError::NoListener | RailError::Detached
        )
    }

    /// Classify a raw runtime error message coming back from the extension APIs.
    pub fn from_runtime_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("context invalidated") || lower.contains("extension context") {
            RailError::ContextInvalidated
        } else if lower.contains("receiving end does not exist")
            || lower.contains("could not establish connection")
        {
            RailError::NoListener
        } else {
            RailError::Channel(message.to_string())
        }
    }
}

impl From<serde_json::Error> for RailError {
    fn from(e: serde_json::Error) -> Self {
        RailError::Serialization(e.to_string())
    }
}
