//! SQLite catalog of books, keyed by content hash.
//!
//! The catalog is the source of truth for what the library contains: a book
//! is only ever presented as indexed once it can be fetched from here, and
//! every row points at a file inside the library directory.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::{ListFilter, Repository};
