//! Error types for the gazette-store crate.

use gazette_common::models::{ContentId, TopicId};
use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced topic does not exist.
    #[error("Topic not found: {0}")]
    TopicNotFound(TopicId),

    /// Referenced content does not exist.
    #[error("Content not found: {0}")]
    ContentNotFound(ContentId),

    /// A topic with this name already exists.
    #[error("Topic already exists: {0}")]
    TopicExists(String),

    /// The SQLite connection or a statement failed.
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// Stored data could not be mapped back into a record.
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// The store could not be reached (also used by fault injection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the failure is about the request itself rather than the store.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TopicNotFound(_) | Self::ContentNotFound(_))
    }
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(tokio_rusqlite::Error::Rusqlite(e))
    }
}
