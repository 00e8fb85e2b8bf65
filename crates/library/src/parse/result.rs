use booksing_extract::error::ErrorKind as ExtractErrorKind;
use booksing_extract::models::Book;
use derive_more::Display;
use std::path::PathBuf;

/// Why a file could not be turned into a book.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The file could not be read from the import directory.
    #[display("unreadable")]
    Unreadable,
    /// No parser understands this kind of file.
    #[display("unsupported")]
    Unsupported,
    /// The parser rejected the contents.
    #[display("parse")]
    Parse,
}
impl From<&ExtractErrorKind> for FailureReason {
    fn from(kind: &ExtractErrorKind) -> Self {
        match kind {
            ExtractErrorKind::Unsupported(_) => FailureReason::Unsupported,
            ExtractErrorKind::Malformed { .. } | ExtractErrorKind::MissingField(_) => FailureReason::Parse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A complete book, not yet given a library path.
    Parsed(Box<Book>),
    Failed(FailureReason),
}

/// One per queued file, produced by a worker and consumed exactly once by
/// the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    /// Relative to the import directory.
    pub path: PathBuf,
    /// Present whenever the file could be read, even if parsing failed.
    pub hash: Option<String>,
    pub outcome: Outcome,
}
impl ParseResult {
    pub fn parsed(path: impl Into<PathBuf>, book: Book) -> Self {
        Self {
            path: path.into(),
            hash: Some(book.hash.clone()),
            outcome: Outcome::Parsed(Box::new(book)),
        }
    }

    pub fn failed(path: impl Into<PathBuf>, hash: Option<String>, reason: FailureReason) -> Self {
        Self {
            path: path.into(),
            hash,
            outcome: Outcome::Failed(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Parsed(_))
    }
}
