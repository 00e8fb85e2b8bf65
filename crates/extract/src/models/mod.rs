mod book;
mod format;
mod metadata;

pub use self::book::Book;
pub use self::format::Format;
pub use self::metadata::Metadata;
