//! Error types for feedform

use thiserror::Error;

/// Result type alias using feedform Error
pub type Result<T> = std::result::Result<T, Error>;

/// feedform error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("creating new feed. Name: {name}, Error: {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("restoring feed. Name: {name}, Error: {source}")]
    RestoreFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("reading feed during read: {source}")]
    ReadFailed {
        #[source]
        source: Box<Error>,
    },

    /// Failure reported by the remote feed service.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown resource type: {0}")]
    UnknownResource(String),
}

impl Error {
    /// Build a remote failure with the given HTTP-style status code.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Error::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether the remote reported the object as absent.
    ///
    /// Only the outermost error is inspected: a wrapped `ReadFailed` is
    /// never treated as not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::Api { status: 404, .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
