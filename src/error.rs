//! Error types for the caster core

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the caster core.
///
/// Every variant is recoverable at the caller boundary. The enum is `Clone`
/// so that one failed production can be handed to every waiter that joined it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Option parsing failed for the given content type
    #[error("Invalid options for {content_type}: {}", fields.join(", "))]
    InvalidOptions {
        content_type: String,
        fields: Vec<String>,
    },

    /// Lookup by artifact id or session id found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The collaborator producing an artifact failed
    #[error("Render failed for {content_type}: {cause}")]
    RenderFailed { content_type: String, cause: String },

    /// Disk tier I/O failed
    #[error("Storage failure ({context}): {source}")]
    StorageFailure {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A control operation was attempted in a state that disallows it
    #[error("Operation '{operation}' not allowed for session {session_id} in state {state}")]
    InvalidSessionState {
        session_id: String,
        state: String,
        operation: String,
    },

    /// The caller stopped waiting for a production
    #[error("Gave up waiting for {content_type} after {after:?}")]
    DeadlineExceeded {
        content_type: String,
        after: Duration,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error with the operation that produced it
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::StorageFailure {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Build an `InvalidOptions` error for a single field
    pub fn invalid_option(content_type: impl Into<String>, field: impl Into<String>) -> Self {
        Error::InvalidOptions {
            content_type: content_type.into(),
            fields: vec![field.into()],
        }
    }

    /// True for lookups that found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::storage("I/O", err)
    }
}
