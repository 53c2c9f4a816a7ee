//! Error types for the store.

use std::io;
use thiserror::Error;

/// Result type alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is absent, or was expired at lookup time.
    #[error("key not found")]
    NotFound,

    /// The slot for this hash is owned by a different key. Handled
    /// transparently by the router unless the overflow pool is disabled.
    #[error("hash collision")]
    Collision,

    /// A data file or stream whose contents cannot be parsed, or a
    /// counter operation on a value that is not exactly 8 bytes.
    #[error("unexpected data format: {0}")]
    Format(String),

    /// Any underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid [`Options`](crate::Options) passed to open.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// One or more shards failed while closing; messages are joined.
    #[error("errors while closing store: {0}")]
    Close(String),
}

impl From<record::RecordError> for StoreError {
    fn from(e: record::RecordError) -> Self {
        StoreError::Format(e.to_string())
    }
}
