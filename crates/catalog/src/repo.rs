//! Book repository.
//!
//! Every method is a single statement, so there is no transaction handling
//! here: the pipeline routes all writes through one task, and a write is
//! visible to the next read as soon as the call returns.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::BookRow;
use booksing_extract::models::{Book, Format};
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::instrument;

/// Narrows [`Repository::list`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Substring match against title or author.
    pub text: Option<String>,
    /// Exact (case-insensitive) author match.
    pub author: Option<String>,
    pub format: Option<Format>,
}
impl ListFilter {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn author(author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_i64(value: usize, what: &'static str) -> Result<i64> {
        i64::try_from(value).or_raise(|| ErrorKind::InvalidData(what))
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub async fn get(&self, hash: impl AsRef<str>) -> Result<Option<Book>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(hash.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Book::try_from).transpose()
    }

    pub async fn contains(&self, hash: impl AsRef<str>) -> Result<bool> {
        Ok(self.get(hash).await?.is_some())
    }

    /// Whether any book already lives at `path` (relative to the library).
    pub async fn path_exists(&self, path: impl AsRef<str>) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(include_str!("../queries/path_exists.sql"))
            .bind(path.as_ref())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(exists)
    }

    /// Newest books first.
    pub async fn list(&self, filter: &ListFilter, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books.sql"))
            .bind(filter.text.as_deref())
            .bind(filter.author.as_deref())
            .bind(filter.format.map(|f| f.to_string()))
            .bind(Self::to_i64(limit, "limit")?)
            .bind(Self::to_i64(offset, "offset")?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Every book in the catalog, used to rebuild the search index.
    pub async fn all(&self) -> Result<Vec<Book>> {
        // SQLite treats a negative LIMIT as "no limit".
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books.sql"))
            .bind(None::<String>)
            .bind(None::<String>)
            .bind(None::<String>)
            .bind(-1_i64)
            .bind(0_i64)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_books.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert or update. `Added` is kept from the first write.
    #[instrument(level = "debug", skip_all, fields(hash = %book.hash))]
    pub async fn put(&self, book: &Book) -> Result<()> {
        let row = BookRow::try_from(book)?;
        Self::bind(sqlx::query(include_str!("../queries/upsert_book.sql")), row)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Insert if no book with this hash exists yet. Returns `false` (and
    /// changes nothing) when the hash is already cataloged.
    #[instrument(level = "debug", skip_all, fields(hash = %book.hash))]
    pub async fn insert(&self, book: &Book) -> Result<bool> {
        let row = BookRow::try_from(book)?;
        let result = Self::bind(sqlx::query(include_str!("../queries/insert_book.sql")), row)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if a row was deleted.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete(&self, hash: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_book.sql"))
            .bind(hash)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    fn bind<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        row: BookRow,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(row.hash)
            .bind(row.title)
            .bind(row.author)
            .bind(row.description)
            .bind(row.added)
            .bind(row.path)
            .bind(row.format)
    }
}
