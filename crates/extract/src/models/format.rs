use crate::error::{Error, ErrorKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// A file format the catalog accepts.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[display("epub")]
    Epub,
    #[display("pdf")]
    Pdf,
    #[display("mobi")]
    Mobi,
    #[display("azw3")]
    Azw3,
    #[display("txt")]
    Txt,
}
impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "epub" => Ok(Format::Epub),
            "pdf" => Ok(Format::Pdf),
            "mobi" => Ok(Format::Mobi),
            "azw3" => Ok(Format::Azw3),
            "txt" => Ok(Format::Txt),
            _ => exn::bail!(ErrorKind::Unsupported(s.to_string())),
        }
    }
}
impl Format {
    /// Detect the format from a file extension. Returns `None` for anything
    /// the catalog does not accept.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref().extension().and_then(|ext| ext.to_str()).and_then(|ext| ext.parse().ok())
    }

    /// File extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Epub => "epub",
            Format::Pdf => "pdf",
            Format::Mobi => "mobi",
            Format::Azw3 => "azw3",
            Format::Txt => "txt",
        }
    }
}
