//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self`. Writes, deletes and listings can be made to fail on
/// demand to exercise the partial-failure paths of the pipeline.
///
/// # Examples
///
/// ```
/// use booksing_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("dune.epub", b"spice")]);
/// assert!(backend.exists(Path::new("dune.epub")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    fail_list: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent `write` and `rename` fail with a backend error
    /// (or succeed again when `false`).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent listing break off with an error after its first
    /// entry.
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every path currently stored, sorted.
    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.storage.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("{}: writes disabled", self.name)));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            let fail = self.fail_list.load(Ordering::SeqCst);
            for (i, entry) in entries.into_iter().enumerate() {
                if fail && i == 1 {
                    yield Err(exn::Exn::from(ErrorKind::BackendError(format!("{}: listing interrupted", self.name))));
                    break;
                }
                yield Ok(entry);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (_inserted, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(data.clone())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("{}: deletes disabled", self.name)));
        }
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.check_writable()?;
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        let mut guard = self.storage.write().await;
        let data = guard.remove(&from).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from)))?;
        guard.insert(to, data);
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (inserted, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_with_files() {
        let backend = MockBackend::with_files([("a/dune.epub", b"1".to_vec()), ("messiah.epub", b"2".to_vec())]);
        assert!(backend.exists(Path::new("a/dune.epub")).await.unwrap());
        assert!(!backend.exists(Path::new("children.epub")).await.unwrap());
        assert_eq!(backend.paths().await, vec![PathBuf::from("a/dune.epub"), PathBuf::from("messiah.epub")]);
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let backend = MockBackend::with_files([("dune.epub", b"1".to_vec())]);
        backend.fail_writes(true);
        assert!(backend.write(Path::new("new.epub"), b"2").await.is_err());
        assert!(backend.rename(Path::new("dune.epub"), Path::new("moved.epub")).await.is_err());
        // Nothing moved.
        assert!(backend.exists(Path::new("dune.epub")).await.unwrap());
        backend.fail_writes(false);
        backend.rename(Path::new("dune.epub"), Path::new("moved.epub")).await.unwrap();
        assert!(backend.exists(Path::new("moved.epub")).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_deletes() {
        let backend = MockBackend::with_files([("dune.epub", b"1".to_vec())]);
        backend.fail_deletes(true);
        assert!(backend.delete(Path::new("dune.epub")).await.is_err());
        assert!(backend.exists(Path::new("dune.epub")).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_list_breaks_off_after_first_entry() {
        let backend = MockBackend::with_files([("a.epub", b"1".to_vec()), ("b.epub", b"2".to_vec()), ("c.epub", b"3".to_vec())]);
        backend.fail_list(true);
        let entries: Vec<_> = backend.list_stream(None).collect().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        let Err(err) = &entries[1] else {
            panic!("expected the listing to break off");
        };
        assert!(matches!(&**err, ErrorKind::BackendError(_)));
        assert!(backend.list(None).await.is_err());

        backend.fail_list(false);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("herbert/dune.epub", b"a".to_vec()),
            ("herbert/messiah.epub", b"b".to_vec()),
            ("asimov/foundation.epub", b"c".to_vec()),
        ]);
        let files = backend.list(Some(Path::new("herbert"))).await.unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", b"bad".to_vec())]);
    }
}
