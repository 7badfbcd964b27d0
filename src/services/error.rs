use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Malformed or missing address fields, empty or oversized files.
    #[error("{0}")]
    Validation(String),
    /// Unknown digest, owner slot, owner row or record.
    #[error("{0}")]
    NotFound(String),
    /// An address whose record points at content that is not registered.
    #[error("{0}")]
    Conflict(String),
    /// An update that had to touch a row touched none.
    #[error("{0}")]
    Integrity(String),
    #[error("short write for `{name}`: wrote {written} of {expected} bytes")]
    ShortWrite {
        name: String,
        written: u64,
        expected: u64,
    },
    #[error("operation timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
