//! The "parse file → metadata or error" capability.
//!
//! Parsing is CPU-bound and synchronous; the pipeline calls it from a
//! blocking thread, so implementations are free to do as much work as they
//! like without starving the async runtime.

mod epub;
mod filename;

pub use self::epub::EpubParser;
pub use self::filename::FilenameParser;
use crate::error::{ErrorKind, Result};
use crate::models::{Format, Metadata};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Extracts [`Metadata`] from a file.
///
/// `path` is the file's location relative to the directory it was found in
/// (useful for filename heuristics); `data` is its complete contents.
pub trait FileParser: Send + Sync {
    fn parse(&self, path: &Path, data: &[u8]) -> Result<Metadata>;
}

pub type ParserHandle = Arc<dyn FileParser>;

/// Dispatches on the file extension.
///
/// - EPUB files are read with [`EpubParser`]; gaps in the OPF metadata are
///   filled in from the filename.
/// - PDF, MOBI, AZW3 and plain text are cataloged from the filename alone.
/// - Anything else is [`Unsupported`](ErrorKind::Unsupported).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParser;
impl FileParser for DefaultParser {
    #[instrument(level = "debug", skip(self, data), fields(path = %path.display(), size = data.len()))]
    fn parse(&self, path: &Path, data: &[u8]) -> Result<Metadata> {
        let Some(format) = Format::from_path(path) else {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            exn::bail!(ErrorKind::Unsupported(ext.to_string()));
        };
        let from_name = FilenameParser.parse(path, data)?;
        match format {
            Format::Epub => Ok(EpubParser.parse(path, data)?.or_else(from_name)),
            Format::Pdf | Format::Mobi | Format::Azw3 | Format::Txt => Ok(from_name),
        }
    }
}
