//! Error types for LOFT.

use thiserror::Error;

/// Common error type for LOFT operations.
///
/// Authorization and not-found failures are always returned as typed
/// variants so callers (e.g. an HTTP boundary) can map them to stable
/// status codes without inspecting message strings.
#[derive(Error, Debug)]
pub enum LoftError {
    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential verification failed.
    ///
    /// Deliberately carries no detail: an unknown identifier and a wrong
    /// password are indistinguishable to the caller.
    #[error("authentication failed")]
    AuthFailure,

    /// The requester is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No metadata record for the requested resource.
    #[error("{0} not found")]
    NotFound(String),

    /// Metadata exists but the bytes are missing from the backend.
    ///
    /// This is a consistency-repair signal, distinct from [`LoftError::NotFound`].
    #[error("{0} missing from storage backend")]
    NotFoundInBackend(String),

    /// The resource already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The backend failed while persisting bytes; no metadata was written.
    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    /// The backend failed while removing bytes.
    ///
    /// Non-fatal for delete operations; surfaced as a warning log there.
    #[error("storage remove failed: {0}")]
    StorageRemoveFailed(String),

    /// The backend could not create a folder.
    #[error("folder create failed: {0}")]
    FolderCreateFailed(String),

    /// The uploaded archive could not be read or extracted.
    #[error("invalid archive: {0}")]
    ArchiveInvalid(String),

    /// Generic storage backend failure (transport errors, unexpected
    /// responses) outside the write/remove paths.
    #[error("storage backend error: {0}")]
    Storage(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for LoftError {
    fn from(e: sqlx::Error) -> Self {
        LoftError::Database(e.to_string())
    }
}

/// Result type alias for LOFT operations.
pub type Result<T> = std::result::Result<T, LoftError>;
