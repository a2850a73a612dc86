use clipthread_shared::{CredentialError, RecordId, SharedError};
use thiserror::Error;

/// Errors produced by the store layer.
///
/// "Not found" and "duplicate rejected" are not errors: they surface as
/// `None`, `false` or an empty list.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A document could not be encoded to or decoded from JSON.
    #[error("Document encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking task running a database call panicked or was cancelled.
    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A previous database call panicked while holding the connection.
    #[error("Database connection lock poisoned")]
    Poisoned,

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (database directory, media purge).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// An identifier was not of the store's native id type.
    #[error("Invalid key type: {0}")]
    InvalidKeyType(String),

    /// A filter, sort or patch named a field that is not a plain identifier.
    #[error("Invalid field name: {0}")]
    InvalidField(String),

    /// A record did not serialize to a JSON object.
    #[error("Record for collection {0} is not a JSON object")]
    NotADocument(&'static str),

    /// A comment references a parent that is not part of the fetched set.
    #[error("Inconsistent comment tree: comment {comment_id} references missing parent {parent_id}")]
    BrokenCommentTree {
        comment_id: RecordId,
        parent_id: RecordId,
    },

    /// A populated view references a record that does not exist.
    #[error("Dangling reference to {collection} record {id}")]
    DanglingReference {
        collection: &'static str,
        id: RecordId,
    },

    /// Password hashing failure.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

impl From<SharedError> for StoreError {
    fn from(err: SharedError) -> Self {
        match err {
            SharedError::InvalidId(raw) => StoreError::InvalidKeyType(raw),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
