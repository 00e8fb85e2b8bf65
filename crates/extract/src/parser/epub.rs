//! EPUB metadata via the `epub` crate.

use super::FileParser;
use crate::consts::{MARKUP_REGEX, WHITESPACE_REGEX};
use crate::error::{ErrorKind, Result};
use crate::models::Metadata;
use epub::doc::EpubDoc;
use std::io::Cursor;
use std::path::Path;

/// Reads the Dublin Core fields (`title`, `creator`, `description`) from the
/// package document. Only the container and OPF are inspected; chapter
/// content is never touched.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubParser;
impl FileParser for EpubParser {
    fn parse(&self, _path: &Path, data: &[u8]) -> Result<Metadata> {
        let doc = EpubDoc::from_reader(Cursor::new(data.to_vec())).map_err(|e| ErrorKind::Malformed {
            format: "epub",
            reason: e.to_string(),
        })?;
        let field = |name: &str| doc.mdata(name).map(|m| clean(&m.value)).unwrap_or_default();
        Ok(Metadata {
            title: field("title"),
            author: field("creator"),
            description: field("description"),
        })
    }
}

/// Descriptions are frequently HTML fragments; flatten them to one line of text.
fn clean(value: &str) -> String {
    let text = MARKUP_REGEX.replace_all(value, " ");
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  Dune  ", "Dune")]
    #[case("<p>A desert <em>planet</em>.</p>", "A desert planet .")]
    #[case("line\n\n   break", "line break")]
    fn test_clean(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean(input), expected);
    }

    #[test]
    fn test_not_an_epub() {
        let err = EpubParser.parse(Path::new("dune.epub"), b"This is not an EPUB").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Malformed { .. }));
    }
}
