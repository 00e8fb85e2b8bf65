use super::FileParser;
use crate::consts::AUTHOR_TITLE_REGEX;
use crate::error::{ErrorKind, Result};
use crate::models::Metadata;
use exn::OptionExt;
use std::path::Path;

/// Derives metadata from the file name alone.
///
/// `Author - Title.ext` splits into author and title; anything else becomes
/// the title with underscores turned into spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameParser;
impl FileParser for FilenameParser {
    fn parse(&self, path: &Path, _data: &[u8]) -> Result<Metadata> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.replace('_', " "))
            .filter(|s| !s.trim().is_empty())
            .ok_or_raise(|| ErrorKind::MissingField("title"))?;
        if let Some(captures) = AUTHOR_TITLE_REGEX.captures(&stem) {
            return Ok(Metadata::new(&captures["title"], &captures["author"], ""));
        }
        Ok(Metadata::new(stem.trim(), "", ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Frank Herbert - Dune.epub", "Dune", "Frank Herbert")]
    #[case("import/Frank Herbert - Dune Messiah.pdf", "Dune Messiah", "Frank Herbert")]
    #[case("Herbert, Frank - Children of Dune - Book 3.mobi", "Children of Dune - Book 3", "Herbert, Frank")]
    #[case("god_emperor_of_dune.epub", "god emperor of dune", "")]
    #[case("Dune.txt", "Dune", "")]
    fn test_filename_heuristics(#[case] path: &str, #[case] title: &str, #[case] author: &str) {
        let metadata = FilenameParser.parse(Path::new(path), b"").unwrap();
        assert_eq!(metadata.title, title);
        assert_eq!(metadata.author, author);
    }

    #[test]
    fn test_empty_stem_is_rejected() {
        assert!(FilenameParser.parse(Path::new("___.epub"), b"").is_err());
    }
}
