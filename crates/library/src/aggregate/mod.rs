//! The single writer: turns parse results into catalog entries and file moves.

mod aggregator;
mod placement;

pub use self::aggregator::Aggregator;
use crate::error::Result;
use crate::parse::ParseResult;
use crate::status::Counter;
use booksing_extract::models::Book;
use std::path::PathBuf;
use tokio::sync::oneshot;

/// Work for the aggregator task. Everything that mutates the catalog goes
/// through this queue.
#[derive(Debug)]
pub enum Command {
    Consume(ParseResult),
    /// Delete a book from the library, the catalog and the search index.
    /// Replies `false` if the hash is not cataloged.
    Remove {
        hash: String,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// What happened to one file from the import directory.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Cataloged and moved into the library.
    Added(Book),
    /// Already cataloged but missing from the library: the file was moved to
    /// the cataloged path.
    Restored(Book),
    /// Already cataloged; the import copy was deleted.
    Duplicate,
    /// Moved to this path in the quarantine directory.
    Quarantined(PathBuf),
    /// Left in the import directory for the next cycle.
    Deferred,
}

impl Disposition {
    pub fn counter(&self) -> Counter {
        match self {
            Disposition::Added(_) | Disposition::Restored(_) => Counter::Added,
            Disposition::Duplicate => Counter::Duplicate,
            Disposition::Quarantined(_) => Counter::Failed,
            Disposition::Deferred => Counter::Deferred,
        }
    }
}
