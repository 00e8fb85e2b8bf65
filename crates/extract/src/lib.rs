//! Everything the pipeline knows about a book before it reaches the catalog:
//! the [`Book`](models::Book) record, its content hash, and the
//! [`FileParser`] capability that turns a file into [`Metadata`](models::Metadata).

mod consts;
pub mod error;
pub mod models;
mod parser;

pub use crate::parser::{DefaultParser, EpubParser, FileParser, FilenameParser, ParserHandle};

/// Content fingerprint of a file: the BLAKE3 digest of its raw bytes, in hex.
///
/// Two files hash identically if and only if they are byte-identical, which
/// is what makes the hash usable as both the catalog key and the search
/// index primary key.
pub fn content_hash(data: impl AsRef<[u8]>) -> String {
    blake3::hash(data.as_ref()).to_hex().to_string()
}
