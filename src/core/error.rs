//! Error types for pluginhub.

use thiserror::Error;

/// Result type alias for pluginhub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pluginhub operations.
#[derive(Error, Debug)]
pub enum Error {
    // Registration errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin already exists: {0}")]
    AlreadyExists(String),

    // Lifecycle errors
    #[error("Plugin {plugin_id} cannot {action} while {state}")]
    InvalidState {
        plugin_id: String,
        state: String,
        action: String,
    },

    #[error("Plugin load failed: {0}")]
    Load(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    // Collaborator errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service bridge error: {0}")]
    Bridge(String),

    #[error("Event delivery failed for {} plugin(s): {}", .0.len(), .0.join("; "))]
    EventDelivery(Vec<String>),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Prefix the message with `context`, keeping the error kind.
    pub fn context(self, context: &str) -> Self {
        match self {
            Error::Validation(m) => Error::Validation(format!("{context}: {m}")),
            Error::NotFound(m) => Error::NotFound(format!("{context}: {m}")),
            Error::AlreadyExists(m) => Error::AlreadyExists(format!("{context}: {m}")),
            Error::Load(m) => Error::Load(format!("{context}: {m}")),
            Error::Sandbox(m) => Error::Sandbox(format!("{context}: {m}")),
            Error::Storage(m) => Error::Storage(format!("{context}: {m}")),
            Error::Bridge(m) => Error::Bridge(format!("{context}: {m}")),
            Error::Serialization(m) => Error::Serialization(format!("{context}: {m}")),
            Error::Internal(m) => Error::Internal(format!("{context}: {m}")),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{context}: {e}"))),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
