use crate::error::{Error, ErrorKind};
use booksing_extract::models::{Book, Format};
use exn::ResultExt;
use time::OffsetDateTime;

/// A `books` row as SQLite stores it.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) hash: String,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) description: String,
    pub(crate) added: i64,
    pub(crate) path: String,
    pub(crate) format: String,
}
impl TryFrom<&Book> for BookRow {
    type Error = Error;
    fn try_from(book: &Book) -> Result<Self, Self::Error> {
        Ok(Self {
            hash: book.hash.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            added: i64::try_from(book.added.unix_timestamp_nanos()).or_raise(|| ErrorKind::InvalidData("added"))?,
            path: book.path.clone(),
            format: book.format.to_string(),
        })
    }
}
impl TryFrom<BookRow> for Book {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            hash: row.hash,
            title: row.title,
            author: row.author,
            description: row.description,
            added: OffsetDateTime::from_unix_timestamp_nanos(i128::from(row.added))
                .or_raise(|| ErrorKind::InvalidData("added"))?,
            path: row.path,
            format: row.format.parse::<Format>().or_raise(|| ErrorKind::InvalidData("format"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booksing_extract::models::Metadata;

    #[test]
    fn test_row_round_trip_keeps_nanoseconds() {
        let book = Book::new("abc", Metadata::new("Dune", "Frank Herbert", ""), Format::Epub).with_path("f/dune.epub");
        let row = BookRow::try_from(&book).unwrap();
        assert_eq!(row.format, "epub");
        assert_eq!(Book::try_from(row).unwrap(), book);
    }

    #[test]
    fn test_unknown_format_is_invalid() {
        let row = BookRow {
            hash: "abc".to_string(),
            title: String::new(),
            author: String::new(),
            description: String::new(),
            added: 0,
            path: "abc.docx".to_string(),
            format: "docx".to_string(),
        };
        let err = Book::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("format")));
    }
}
