//! Moving files between backends.

use crate::error::{Error, ErrorKind, Result};
use crate::{StorageBackend, validate_path};
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tokio::fs;

/// Moves `source` out of the `from` backend and into `target` of the `to`
/// backend.
///
/// Two local backends are connected with a plain rename. When the directories
/// live on different devices (or either backend is not local) the file is
/// copied and the source deleted afterwards; if that delete fails the copy is
/// removed again so the file only ever exists in one place.
///
/// Like [`StorageBackend::rename`], an existing `target` is overwritten. Pick
/// a free path first.
///
/// On failure nothing is left at `target`, unless the error is
/// [`Stranded`](ErrorKind::Stranded): then a complete or partial copy is still
/// there and the caller has to deal with it.
#[tracing::instrument(level = "debug", skip_all, fields(from = from.name(), to = to.name(), source = %source.display(), target = %target.display()))]
pub async fn relocate(from: &dyn StorageBackend, source: &Path, to: &dyn StorageBackend, target: &Path) -> Result<()> {
    if let (Some(from_root), Some(to_root)) = (from.root(), to.root()) {
        let source_abs = from_root.join(validate_path(source)?);
        let target_abs = to_root.join(validate_path(target)?);
        if let Some(parent) = target_abs.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, target))?;
        }
        match fs::rename(&source_abs, &target_abs).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == IoErrorKind::CrossesDevices => {
                tracing::debug!("directories are on different devices; copying instead");
            },
            Err(e) => exn::bail!(ErrorKind::from_io(e, source)),
        }
    }
    let data = from.read(source).await?;
    if let Err(e) = to.write(target, &data).await {
        // A write that fails part way can leave a truncated file behind.
        return Err(discard_copy(to, target, e).await);
    }
    if let Err(e) = from.delete(source).await {
        return Err(discard_copy(to, target, e).await);
    }
    Ok(())
}

/// Remove the copy at `target` after `cause` aborted a move.
async fn discard_copy(to: &dyn StorageBackend, target: &Path, cause: Error) -> Error {
    match to.delete(target).await {
        Ok(()) => cause,
        Err(e) if matches!(&*e, ErrorKind::NotFound(_)) => cause,
        Err(e) => {
            tracing::error!(backend = to.name(), target = %target.display(), "unable to remove copy after failed move");
            Error::raise_all::<ErrorKind, _>(ErrorKind::Stranded(target.to_path_buf()), [cause, e])
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_relocate_between_local_backends() {
        let import_dir = tempfile::tempdir().unwrap();
        let library_dir = tempfile::tempdir().unwrap();
        let import = LocalBackend::new("import", import_dir.path()).unwrap();
        let library = LocalBackend::new("library", library_dir.path()).unwrap();
        import.write(Path::new("dune.epub"), b"spice").await.unwrap();

        relocate(&import, Path::new("dune.epub"), &library, Path::new("h/herbert/dune.epub")).await.unwrap();

        assert!(!import.exists(Path::new("dune.epub")).await.unwrap());
        assert_eq!(library.read(Path::new("h/herbert/dune.epub")).await.unwrap(), b"spice");
    }

    #[tokio::test]
    async fn test_relocate_missing_source() {
        let import_dir = tempfile::tempdir().unwrap();
        let library_dir = tempfile::tempdir().unwrap();
        let import = LocalBackend::new("import", import_dir.path()).unwrap();
        let library = LocalBackend::new("library", library_dir.path()).unwrap();

        let err = relocate(&import, Path::new("gone.epub"), &library, Path::new("gone.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_relocate_copies_between_mock_backends() {
        use crate::backend::MockBackend;
        let import = MockBackend::with_files([("dune.epub", b"spice".to_vec())]);
        let library = MockBackend::default();

        relocate(&import, Path::new("dune.epub"), &library, Path::new("dune.epub")).await.unwrap();

        assert!(import.paths().await.is_empty());
        assert_eq!(library.read(Path::new("dune.epub")).await.unwrap(), b"spice");
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_failed_source_delete_removes_copy() {
        use crate::backend::MockBackend;
        let import = MockBackend::with_files([("dune.epub", b"spice".to_vec())]);
        let library = MockBackend::default();
        import.fail_deletes(true);

        let err = relocate(&import, Path::new("dune.epub"), &library, Path::new("dune.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BackendError(_)));
        assert!(import.exists(Path::new("dune.epub")).await.unwrap());
        assert!(library.paths().await.is_empty());
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_copy_that_cannot_be_removed_is_reported() {
        use crate::backend::MockBackend;
        let import = MockBackend::with_files([("dune.epub", b"spice".to_vec())]);
        let library = MockBackend::default();
        import.fail_deletes(true);
        library.fail_deletes(true);

        let err = relocate(&import, Path::new("dune.epub"), &library, Path::new("h/dune.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Stranded(p) if p == Path::new("h/dune.epub")));
        assert_eq!(library.paths().await, [PathBuf::from("h/dune.epub")]);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_relocate_failure_leaves_source_in_place() {
        use crate::backend::MockBackend;
        let import = MockBackend::with_files([("dune.epub", b"spice".to_vec())]);
        let library = MockBackend::default();
        library.fail_writes(true);

        assert!(relocate(&import, Path::new("dune.epub"), &library, Path::new("dune.epub")).await.is_err());

        assert!(import.exists(Path::new("dune.epub")).await.unwrap());
        assert!(library.paths().await.is_empty());
    }
}
