//! Search Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A search index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for search index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The index could not be reached, or answered with a server error.
    #[display("search index unavailable")]
    Unavailable,
    /// The index refused the request (bad key, bad index name, bad document).
    #[display("request rejected by search index: {_0}")]
    Rejected(#[error(not(source))] String),
    /// An asynchronous index task finished without succeeding.
    #[display("index task {uid} {status}: {reason}")]
    TaskFailed {
        uid: u64,
        status: String,
        reason: String,
    },
    /// Gave up waiting for an index task to finish.
    #[display("timed out waiting for index task {_0}")]
    Timeout(#[error(not(source))] u64),
    /// The index answered with something we could not decode.
    #[display("invalid response from search index")]
    InvalidResponse,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Unavailable | ErrorKind::Timeout(_))
    }
}
