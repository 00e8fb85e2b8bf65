//! Picking free file names in the library and quarantine directories.

use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Numbered variants tried after the preferred name and its tagged variant.
pub(crate) const MAX_ATTEMPTS: usize = 100;

/// `dir/name.ext` becomes `dir/name-{suffix}.ext`.
pub(crate) fn with_suffix(path: &Path, suffix: impl Display) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{suffix}"),
    };
    path.with_file_name(name)
}

/// Names to try, in order: the preferred path, the path tagged with `tag`
/// (unless its stem already ends with it), then `-2`, `-3`, ...
pub(crate) fn candidates<'a>(preferred: &'a Path, tag: Option<&'a str>) -> impl Iterator<Item = PathBuf> + 'a {
    let tagged = tag
        .filter(|tag| !tag.is_empty())
        .filter(|tag| !preferred.file_stem().is_some_and(|stem| stem.to_string_lossy().ends_with(*tag)))
        .map(|tag| with_suffix(preferred, tag));
    std::iter::once(preferred.to_path_buf())
        .chain(tagged)
        .chain((2..=MAX_ATTEMPTS).map(move |n| with_suffix(preferred, n)))
}
