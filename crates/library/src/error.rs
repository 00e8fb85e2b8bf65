//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a pipeline failure.
///
/// Per-file problems (unparseable books, duplicates, failed moves) are not
/// errors at this level: they are counted in the [`Status`](crate::Status)
/// and the pipeline carries on. What surfaces here is directory-level or
/// storage-engine-level trouble, and misuse of a stopped pipeline.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The path template failed to compile or render.
    #[display("issue with path generation from template")]
    Template,
    /// The import directory could not be listed.
    #[display("unable to list the import directory")]
    Listing,
    /// A catalog read or write failed.
    #[display("catalog error")]
    Catalog,
    /// A storage backend operation failed.
    #[display("storage error")]
    Storage,
    /// Every name tried for a file near this path was already taken.
    #[display("no free path near {}", _0.display())]
    Placement(#[error(not(source))] PathBuf),
    /// The search index rejected a request or could not be reached.
    #[display("search index error")]
    Index,
    /// A catalog write could not be undone after a failed move; the catalog
    /// may reference a book whose file is not in the library.
    #[display("catalog rollback failed for {_0}")]
    Rollback(#[error(not(source))] String),
    /// The pipeline has shut down (or is shutting down) and cannot accept
    /// the request.
    #[display("pipeline is not running")]
    Closed,
    /// A pipeline task panicked or was aborted.
    #[display("pipeline task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Listing | ErrorKind::Storage | ErrorKind::Index)
    }
}
