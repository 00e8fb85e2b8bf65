use super::{Format, Metadata};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A content-addressed catalog entry.
///
/// `hash` is the primary key everywhere: in the catalog database, in the
/// search index and in the pipeline's dedup check. Field names serialize in
/// PascalCase so the search index sees `Hash` as its primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Book {
    /// BLAKE3 hash of the file content (see [`content_hash`](crate::content_hash)).
    pub hash: String,
    pub title: String,
    pub author: String,
    pub description: String,
    /// When the record entered the catalog. Never changes afterwards.
    #[serde(with = "time::serde::rfc3339")]
    pub added: OffsetDateTime,
    /// Location of the file, relative to the library directory.
    #[serde(default)]
    pub path: String,
    pub format: Format,
}
impl AsRef<Book> for Book {
    fn as_ref(&self) -> &Book {
        self
    }
}
impl Book {
    /// A freshly accepted book, stamped with the current time. The library
    /// path is unknown until the aggregator has picked one.
    pub fn new(hash: impl Into<String>, metadata: Metadata, format: Format) -> Self {
        Self {
            hash: hash.into(),
            title: metadata.title,
            author: metadata.author,
            description: metadata.description,
            added: OffsetDateTime::now_utc(),
            path: String::new(),
            format,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// First eight hex digits of the hash; enough to disambiguate filenames.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}
