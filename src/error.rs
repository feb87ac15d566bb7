//! Error handling for the topic tree engine
//!
//! This module defines the crate-level error type and a Result alias.
//! Payload decode problems are not represented here: they are absorbed at the
//! decode boundary (see [`crate::pipeline::error::DecodeError`]) and degrade to
//! best-effort rendering instead of propagating.

use thiserror::Error;

/// Main error type for topic tree operations
#[derive(Error, Debug)]
pub enum TopicTreeError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A payload record could not be reconstructed (copy-construction error)
    #[error("Malformed payload record: {0}")]
    MalformedRecord(String),

    /// Operation is not allowed in the tree's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TopicTreeError>,
    },
}

impl TopicTreeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TopicTreeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for TopicTreeError {
    fn from(err: serde_json::Error) -> Self {
        TopicTreeError::Serialization(err.to_string())
    }
}

/// Result type alias for topic tree operations
pub type Result<T> = std::result::Result<T, TopicTreeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
