//! Full-text search over the catalog.
//!
//! The index is a derived, eventually-consistent view of the catalog: books
//! reach it in batches, a failed batch is not retried, and `reindex` rebuilds
//! it from the catalog. Nothing here is authoritative.

pub mod error;
#[cfg(feature = "meili")]
mod meili;
#[cfg(any(test, feature = "mock"))]
mod memory;

use crate::error::Result;
use async_trait::async_trait;
use booksing_extract::models::Book;
#[cfg(feature = "meili")]
pub use crate::meili::MeiliIndex;
#[cfg(any(test, feature = "mock"))]
pub use crate::memory::MemoryIndex;
use std::sync::Arc;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

/// Identifier of an asynchronous indexing task.
pub type TaskId = u64;

pub type SearchHandle = Arc<dyn SearchIndex>;

/// How many days an empty query looks back before giving up.
pub const RECENCY_WINDOW_DAYS: i64 = 30;

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Used for logging only.
    fn name(&self) -> &str;

    /// Insert or replace `books` in a single request.
    ///
    /// Callers must not pass two books with the same hash. With `wait`, the
    /// call returns only once the index reports the task as processed.
    async fn batch_upsert(&self, books: &[Book], wait: bool) -> Result<TaskId>;

    /// Raw full-text query. An empty `text` is passed through as-is.
    async fn query(&self, text: &str, limit: usize, offset: usize) -> Result<Vec<Book>>;

    /// Offset in which `Added` timestamps are indexed, and so the one whose
    /// calendar day the recency scan starts from.
    fn utc_offset(&self) -> UtcOffset {
        UtcOffset::UTC
    }

    /// Full-text search, falling back to a recency scan for an empty query.
    async fn search(&self, text: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        if text.trim().is_empty() {
            let today = OffsetDateTime::now_utc().to_offset(self.utc_offset()).date();
            return recent(self, today, limit, offset).await;
        }
        self.query(text, limit, offset).await
    }

    async fn get(&self, hash: &str) -> Result<Option<Book>>;

    /// Deleting a hash the index does not know about is not an error.
    async fn delete(&self, hash: &str) -> Result<()>;
}

/// The most recent non-empty day of additions: today's date string is
/// queried first, then each previous day, up to [`RECENCY_WINDOW_DAYS`].
pub async fn recent<I>(index: &I, today: Date, limit: usize, offset: usize) -> Result<Vec<Book>>
where
    I: SearchIndex + ?Sized,
{
    for day in 0..RECENCY_WINDOW_DAYS {
        let Some(date) = today.checked_sub(Duration::days(day)) else {
            break;
        };
        let hits = index.query(&date_key(date), limit, offset).await?;
        if !hits.is_empty() {
            tracing::debug!(index = index.name(), %date, hits = hits.len(), "recency scan hit");
            return Ok(hits);
        }
    }
    Ok(Vec::new())
}

/// `YYYY-MM-DD`, the prefix of every RFC 3339 `Added` timestamp on that day.
fn date_key(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}
