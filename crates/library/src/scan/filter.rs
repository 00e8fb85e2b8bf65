use std::path::{Component, Path};

/// Extensions browsers and sync tools use while a download is in progress.
const PARTIAL_EXTENSIONS: [&str; 3] = ["part", "crdownload", "tmp"];

/// Whether a file found in the import directory should be picked up.
///
/// Hidden files (and anything inside a hidden directory) and partially
/// written downloads are left alone.
pub fn is_candidate(path: &Path) -> bool {
    let hidden = path.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
        _ => false,
    });
    let partial = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PARTIAL_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)));
    !hidden && !partial
}
