//! In-memory search index for testing.

use crate::error::{ErrorKind, Result};
use crate::{SearchIndex, TaskId};
use async_trait::async_trait;
use booksing_extract::models::Book;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

/// Records every batch it receives and answers queries with a naive
/// case-insensitive substring match over the document fields (including the
/// RFC 3339 `Added` timestamp, like a real full-text index would).
///
/// Upserts and deletes can be made to fail on demand.
pub struct MemoryIndex {
    documents: RwLock<HashMap<String, Book>>,
    batches: RwLock<Vec<Vec<String>>>,
    fail_upserts: AtomicBool,
    fail_deletes: AtomicBool,
    next_task: AtomicU64,
    utc_offset: UtcOffset,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self {
            documents: RwLock::default(),
            batches: RwLock::default(),
            fail_upserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            next_task: AtomicU64::new(0),
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match `Added` timestamps as seen from `offset`.
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Make every subsequent `batch_upsert` fail (or succeed again when `false`).
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Hashes of every successfully applied batch, in the order received.
    pub async fn batches(&self) -> Vec<Vec<String>> {
        self.batches.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn matches(&self, book: &Book, terms: &[String]) -> bool {
        let added = book.added.to_offset(self.utc_offset).format(&Rfc3339).unwrap_or_default();
        let haystack = [
            book.hash.as_str(),
            book.title.as_str(),
            book.author.as_str(),
            book.description.as_str(),
            added.as_str(),
        ]
        .join(" ")
        .to_lowercase();
        terms.iter().all(|term| haystack.contains(term.as_str()))
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn utc_offset(&self) -> UtcOffset {
        self.utc_offset
    }

    async fn batch_upsert(&self, books: &[Book], _wait: bool) -> Result<TaskId> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable);
        }
        let mut documents = self.documents.write().await;
        for book in books {
            documents.insert(book.hash.clone(), book.clone());
        }
        self.batches.write().await.push(books.iter().map(|b| b.hash.clone()).collect());
        Ok(self.next_task.fetch_add(1, Ordering::SeqCst))
    }

    async fn query(&self, text: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let documents = self.documents.read().await;
        let mut hits: Vec<&Book> = documents.values().filter(|b| self.matches(b, &terms)).collect();
        hits.sort_by(|a, b| b.added.cmp(&a.added).then_with(|| a.hash.cmp(&b.hash)));
        Ok(hits.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get(&self, hash: &str) -> Result<Option<Book>> {
        Ok(self.documents.read().await.get(hash).cloned())
    }

    async fn delete(&self, hash: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable);
        }
        self.documents.write().await.remove(hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booksing_extract::models::{Format, Metadata};

    fn book(hash: &str, title: &str, author: &str) -> Book {
        Book::new(hash, Metadata::new(title, author, ""), Format::Epub)
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_hash() {
        let index = MemoryIndex::new();
        index.batch_upsert(&[book("h1", "Dune", "Frank Herbert")], false).await.unwrap();
        index.batch_upsert(&[book("h1", "Dune (revised)", "Frank Herbert")], false).await.unwrap();
        assert_eq!(index.len().await, 1);
        assert_eq!(index.get("h1").await.unwrap().unwrap().title, "Dune (revised)");
        assert_eq!(index.batches().await, vec![vec!["h1".to_string()], vec!["h1".to_string()]]);
    }

    #[tokio::test]
    async fn test_query_matches_all_terms() {
        let index = MemoryIndex::new();
        let books = [book("h1", "Dune", "Frank Herbert"), book("h2", "The Dispossessed", "Ursula K. Le Guin")];
        index.batch_upsert(&books, false).await.unwrap();
        assert_eq!(index.query("frank dune", 10, 0).await.unwrap().len(), 1);
        assert_eq!(index.query("le guin", 10, 0).await.unwrap()[0].hash, "h2");
        assert!(index.query("frank dispossessed", 10, 0).await.unwrap().is_empty());
        assert_eq!(index.query("", 10, 0).await.unwrap().len(), 2);
        assert_eq!(index.query("", 10, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_upserts_change_nothing() {
        let index = MemoryIndex::new();
        index.fail_upserts(true);
        let err = index.batch_upsert(&[book("h1", "Dune", "")], true).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(index.is_empty().await);
        assert!(index.batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok() {
        let index = MemoryIndex::new();
        index.delete("nope").await.unwrap();
    }
}
