//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No parser understands this kind of file.
    #[display("unsupported format: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// The file claims a supported format but its contents are broken.
    #[display("malformed {format}: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },
    /// The document parsed, but a field required to catalog it is missing.
    #[display("missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The file is either parseable or it isn't.
        false
    }
}
