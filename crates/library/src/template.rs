//! Path templating for the library directory.
//!
//! Converts [`Book`] metadata into deterministic library paths using
//! user-configured [upon] templates (`{{ variable }}`,
//! `{{ value|formatter }}`), extended with a few path-friendly helpers:
//!
//! - **`slug`** converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`initial`** renders the first letter or digit of a string, lowercased
//!   (`_` when there is none).
//! - **`truncate`** truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable    | Type     | Description                                  |
//! |-------------|----------|----------------------------------------------|
//! | `title`     | `String` | Book title, `Untitled` when empty            |
//! | `author`    | `String` | Book author, `Unknown` when empty            |
//! | `hash`      | `String` | First eight hex digits of the content hash   |
//! | `full_hash` | `String` | The complete content hash                    |
//! | `format`    | `String` | File format (`epub`, `pdf`, ...)             |
//! | `year`      | `i64`    | Year the book was added to the catalog       |
//!
//! # Example
//!
//! ```
//! use booksing_extract::models::{Book, Format, Metadata};
//! use booksing_library::PathGenerator;
//!
//! let book = Book::new("af1349b9f5f9a1a6", Metadata::new("Dune", "Frank Herbert", ""), Format::Epub);
//! let generator: PathGenerator = booksing_library::DEFAULT_TEMPLATE.parse().unwrap();
//! let path = generator.generate_with_ext(&book).unwrap();
//! assert_eq!(path, "f/frank-herbert/dune-af1349b9.epub");
//! ```

use crate::error::{Error, ErrorKind, Result};
use booksing_extract::models::Book;
use booksing_storage::validate_path;
use exn::{OptionExt, ResultExt};
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

pub const DEFAULT_TEMPLATE: &str = "{{ author|initial }}/{{ author|slug }}/{{ title|slug }}-{{ hash }}";

/// Generates deterministic library paths from [`Book`] metadata and a
/// user-defined template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at startup rather than on the first import.
///
/// Generated paths are normalized (trimmed, deduplicated separators) and
/// validated by [`booksing_storage::validate_path`] so they cannot escape the
/// library directory.
pub struct PathGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for PathGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl PathGenerator {
    /// Renders the template for `book`, without a file extension.
    #[instrument(level = "debug", skip_all, fields(hash = %book.as_ref().hash))]
    pub fn generate(&self, book: impl AsRef<Book>) -> Result<String> {
        let path = self
            .template
            .render(&self.engine, Self::parameters(book.as_ref()))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Self::normalize(path)
    }

    /// Renders the template and appends the extension of the book's format.
    pub fn generate_with_ext(&self, book: impl AsRef<Book>) -> Result<String> {
        let book = book.as_ref();
        let path = self.generate(book)?;
        Ok(format!("{path}.{}", book.format.extension()))
    }

    /// Trims each path segment, drops empty ones, joins them with `/`, then
    /// validates via [`booksing_storage::validate_path`].
    fn normalize(s: impl Into<String>) -> Result<String> {
        let path = s.into().split('/').map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/");
        let path = validate_path(&path).or_raise(|| ErrorKind::Template)?;
        Ok(path.to_str().ok_or_raise(|| ErrorKind::Template)?.to_string())
    }

    fn parameters(book: &Book) -> upon::Value {
        let or = |value: &str, fallback: &str| match value.trim() {
            "" => fallback.to_string(),
            v => v.to_string(),
        };
        upon::value! {
            title: or(&book.title, "Untitled"),
            author: or(&book.author, "Unknown"),
            hash: book.short_hash(),
            full_hash: &book.hash,
            format: book.format.extension(),
            year: i64::from(book.added.year()),
        }
    }
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    // Various quotation marks: '"''""„"`«»‹›
    const QUOTES: [char; 13] = [
        '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}', '\u{0060}',
        '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
    ];

    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let stripped: String = s.chars().filter(|c| !QUOTES.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    /// Authors sort into `a/` .. `z/` and `0/` .. `9/`.
    fn initial_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let initial = slugify!(s).chars().find(|c| c.is_ascii_alphanumeric()).unwrap_or('_');
                write!(f, "{initial}")?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_formatter("initial", initial_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booksing_extract::models::{Format, Metadata};
    use rstest::rstest;
    use time::macros::datetime;

    const HASH: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

    fn book(title: &str, author: &str, format: Format) -> Book {
        Book {
            added: datetime!(2024-03-01 12:30:00 UTC),
            ..Book::new(HASH, Metadata::new(title, author, ""), format)
        }
    }

    #[test]
    fn test_default_template_compiles() {
        assert!(DEFAULT_TEMPLATE.parse::<PathGenerator>().is_ok());
        let generator: PathGenerator = DEFAULT_TEMPLATE.parse().unwrap();
        let path = generator.generate_with_ext(book("Dune", "Frank Herbert", Format::Epub)).unwrap();
        assert_eq!(path, "f/frank-herbert/dune-af1349b9.epub");
    }

    #[rstest]
    #[case::empty_author("Dune", "", "u/unknown/dune-af1349b9.pdf")]
    #[case::empty_title("", "Frank Herbert", "f/frank-herbert/untitled-af1349b9.pdf")]
    #[case::non_latin_author("Solaris", "Łem, Stanisław", "l/lem-stanislaw/solaris-af1349b9.pdf")]
    #[case::digit_author("2001", "2001 Collective", "2/2001-collective/2001-af1349b9.pdf")]
    #[case::quotes("\"Hello\" World's 'Test'", "Anon", "a/anon/hello-worlds-test-af1349b9.pdf")]
    fn test_default_layout(#[case] title: &str, #[case] author: &str, #[case] expected: &str) {
        let generator: PathGenerator = DEFAULT_TEMPLATE.parse().unwrap();
        assert_eq!(generator.generate_with_ext(book(title, author, Format::Pdf)).unwrap(), expected);
    }

    #[rstest]
    #[case("{{ year }}/{{ format }}", "2024/mobi")]
    #[case("{{ full_hash }}", HASH)]
    #[case("{{ truncate(title, 4)|slug }}", "dune")]
    #[case("{{ title|truncate: 4|slug }}", "dune")]
    #[case("  {{ author|slug }} // {{ title|slug }}  ", "frank-herbert/dune-messiah")]
    fn test_custom_templates(#[case] template: &str, #[case] expected: &str) {
        let generator: PathGenerator = template.parse().unwrap();
        let path = generator.generate(book("Dune Messiah", "Frank Herbert", Format::Mobi)).unwrap();
        assert_eq!(path, expected);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let generator: PathGenerator = "../{{ title }}".parse().unwrap();
        assert!(generator.generate(book("Dune", "", Format::Epub)).is_err());
    }

    #[test]
    fn test_rejects_invalid_template() {
        assert!("{{ title ".parse::<PathGenerator>().is_err());
    }
}
