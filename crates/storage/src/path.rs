//! Path validation.
//!
//! Every path handed to a backend is relative to that backend's root. Nothing
//! dropped into the import directory is allowed to name a location outside of
//! it, and nothing rendered by the library template may escape the library.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a storage path, rejecting anything that would
/// leave the storage root.
///
/// > **Note:** Null bytes are explicitly rejected; backslashes and non-UTF8
/// >           bytes are passed through untouched.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use booksing_storage::validate_path;
/// assert!(validate_path("h/herbert/dune.epub").is_ok());
/// assert!(validate_path("inbox/../dune.epub").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert_eq!(validate_path("./h//herbert/./dune.epub/").unwrap(), Path::new("h/herbert/dune.epub"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}
