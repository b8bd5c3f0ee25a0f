//! Error types for bearsync-core

use thiserror::Error;

use crate::cloudkit::CloudKitError;

/// Result type alias using bearsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bearsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote service error
    #[error(transparent)]
    CloudKit(#[from] CloudKitError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note not found after a direct lookup and a unique identifier scan
    #[error("Note not found: {0}")]
    NotFound(String),

    /// The server refused a record in a modify batch
    #[error("Record {record_name} rejected by server: {code} {reason}")]
    Rejected {
        record_name: String,
        code: String,
        reason: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage error
    #[error("Credential error: {0}")]
    Credentials(String),
}

impl Error {
    /// Whether the remote service rejected the request itself, as opposed to
    /// the transport or the session failing.
    pub const fn is_api_error(&self) -> bool {
        matches!(self, Self::CloudKit(CloudKitError::Api { .. }))
    }

    /// Whether the session credentials are no longer accepted.
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::CloudKit(CloudKitError::AuthExpired))
    }
}
