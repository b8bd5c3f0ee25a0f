use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(bearsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error(
        "Not signed in. Run `bearsync auth set --web-auth-token <TOKEN> --api-token <TOKEN>`, or set BEARSYNC_WEB_AUTH_TOKEN and BEARSYNC_API_TOKEN."
    )]
    NotSignedIn,
    #[error("CloudKit session expired. Run `bearsync auth set` with a fresh web auth token.")]
    SessionExpired,
}

impl From<bearsync_core::Error> for CliError {
    fn from(error: bearsync_core::Error) -> Self {
        match error {
            bearsync_core::Error::NotFound(id) => Self::NoteNotFound(id),
            error if error.is_auth_expired() => Self::SessionExpired,
            error => Self::Core(error),
        }
    }
}
