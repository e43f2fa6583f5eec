//! Storage error types.
//!
//! Every variant names the repository operation that failed and the input it
//! was called with. A missing record is not an error: lookups return `None`
//! and latest-height queries return `0`.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when using storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{operation} error ({context}): {source}")]
    Database {
        operation: &'static str,
        context: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("{operation} already exists ({context}): {source}")]
    AlreadyExists {
        operation: &'static str,
        context: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("{operation} timed out after {after:?} ({context})")]
    Timeout {
        operation: &'static str,
        context: String,
        after: Duration,
    },
    #[error("Height out of range: {0}")]
    HeightOutOfRange(u64),
}

impl StorageError {
    /// Classifies a sqlx failure; unique-constraint violations become
    /// [`StorageError::AlreadyExists`], everything else [`StorageError::Database`].
    pub(crate) fn from_sqlx(operation: &'static str, context: String, source: sqlx::Error) -> Self {
        match &source {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::AlreadyExists {
                operation,
                context,
                source,
            },
            _ => Self::Database {
                operation,
                context,
                source,
            },
        }
    }

    /// Name of the repository operation that produced this error, if any.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Database { operation, .. }
            | Self::AlreadyExists { operation, .. }
            | Self::Timeout { operation, .. } => Some(operation),
            Self::HeightOutOfRange(_) => None,
        }
    }
}
