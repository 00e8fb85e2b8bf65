use super::placement::candidates;
use super::{Command, Disposition};
use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::parse::{FailureReason, Outcome, ParseResult};
use crate::scan::InFlight;
use crate::status::{IndexingState, Status};
use booksing_extract::models::Book;
use booksing_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use booksing_storage::relocate;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Consumes parse results one at a time.
///
/// Being the only task that writes to the catalog, the aggregator decides
/// which copy of a book is the first: whichever result it consumes first.
/// Every consumed file ends up in exactly one place: the library, the
/// quarantine directory, deleted as a duplicate, or still in the import
/// directory (deferred to the next cycle).
pub struct Aggregator {
    ctx: Arc<Context>,
    status: Arc<Status>,
    inflight: Arc<InFlight>,
    books: mpsc::Sender<Book>,
}

impl Aggregator {
    pub fn new(ctx: Arc<Context>, status: Arc<Status>, inflight: Arc<InFlight>, books: mpsc::Sender<Book>) -> Self {
        Self {
            ctx,
            status,
            inflight,
            books,
        }
    }

    /// Process commands until every sender is gone. Dropping the aggregator
    /// afterwards closes the book queue, which lets the index updater flush
    /// and stop.
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Consume(result) => {
                    let path = result.path.clone();
                    self.consume(result).await;
                    self.inflight.release(&path);
                },
                Command::Remove { hash, reply } => {
                    _ = reply.send(self.remove(&hash).await);
                },
            }
        }
        debug!("aggregator stopped");
    }

    /// Apply one parse result and count its outcome. Errors are logged, flag
    /// the status as [`IndexingState::Error`] and leave the file for the next
    /// cycle.
    pub async fn consume(&self, result: ParseResult) -> Disposition {
        let path = result.path.clone();
        let disposition = match self.consume_result(result).await {
            Ok(disposition) => disposition,
            Err(e) => {
                error!(path = %path.display(), error = ?e, "unable to consume parse result");
                self.status.set_state(IndexingState::Error);
                Disposition::Deferred
            },
        };
        self.status.increment(disposition.counter());
        disposition
    }

    #[instrument(level = "debug", skip_all, fields(path = %result.path.display()))]
    pub async fn consume_result(&self, result: ParseResult) -> Result<Disposition> {
        let ParseResult { path, hash, outcome } = result;
        match outcome {
            Outcome::Parsed(book) => self.accept(&path, *book).await,
            Outcome::Failed(reason) => self.quarantine(&path, hash.as_deref(), reason).await,
        }
    }

    async fn accept(&self, source: &Path, book: Book) -> Result<Disposition> {
        let catalog = &self.ctx.catalog;
        if let Some(existing) = catalog.get(&book.hash).await.or_raise(|| ErrorKind::Catalog)? {
            return self.duplicate(source, existing).await;
        }
        let target = self.library_path(&book).await?;
        let book = book.with_path(target.to_string_lossy());
        if !catalog.insert(&book).await.or_raise(|| ErrorKind::Catalog)? {
            debug!(hash = %book.hash, "cataloged by someone else in the meantime");
            return self.discard(source).await;
        }
        if let Err(e) = relocate(&*self.ctx.import, source, &*self.ctx.library, &target).await {
            warn!(error = ?e, target = %book.path, "unable to move book into the library; rolling back");
            self.clear_stranded(&e, &target).await;
            catalog.delete(&book.hash).await.or_raise(|| ErrorKind::Rollback(book.hash.clone()))?;
            return Ok(Disposition::Deferred);
        }
        info!(hash = %book.short_hash(), target = %book.path, "added to library");
        if self.books.send(book.clone()).await.is_err() {
            warn!(hash = %book.hash, "index updater has stopped; book will only be searchable after a reindex");
        }
        Ok(Disposition::Added(book))
    }

    /// A second copy of a cataloged book. Normally deleted, unless the
    /// library has lost the cataloged file, in which case this copy takes its
    /// place.
    async fn duplicate(&self, source: &Path, existing: Book) -> Result<Disposition> {
        let cataloged = PathBuf::from(&existing.path);
        if self.ctx.library.exists(&cataloged).await.or_raise(|| ErrorKind::Storage)? {
            debug!(existing = %existing.path, "duplicate of a cataloged book");
            return self.discard(source).await;
        }
        match relocate(&*self.ctx.import, source, &*self.ctx.library, &cataloged).await {
            Ok(()) => {
                info!(hash = %existing.short_hash(), target = %existing.path, "restored missing library file");
                Ok(Disposition::Restored(existing))
            },
            Err(e) => {
                warn!(error = ?e, target = %existing.path, "unable to restore missing library file");
                self.clear_stranded(&e, &cataloged).await;
                Ok(Disposition::Deferred)
            },
        }
    }

    /// After a failed move into the library, make sure no copy is left at
    /// `target` that the catalog does not account for.
    async fn clear_stranded(&self, err: &StorageError, target: &Path) {
        if !matches!(&**err, StorageErrorKind::Stranded(_)) {
            return;
        }
        match self.ctx.library.delete(target).await {
            Ok(()) => debug!(target = %target.display(), "removed copy left by failed move"),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {},
            Err(e) => {
                error!(target = %target.display(), error = ?e, "library holds a file the catalog does not know about");
                self.status.set_state(IndexingState::Error);
            },
        }
    }

    async fn discard(&self, source: &Path) -> Result<Disposition> {
        match self.ctx.import.delete(source).await {
            Ok(()) => Ok(Disposition::Duplicate),
            Err(e) => {
                warn!(error = ?e, "unable to delete duplicate from the import directory");
                Ok(Disposition::Deferred)
            },
        }
    }

    async fn quarantine(&self, source: &Path, hash: Option<&str>, reason: FailureReason) -> Result<Disposition> {
        let tag = hash.map(|hash| &hash[..hash.len().min(8)]);
        let target = self.quarantine_path(source, tag).await?;
        match relocate(&*self.ctx.import, source, &*self.ctx.quarantine, &target).await {
            Ok(()) => {
                info!(%reason, target = %target.display(), "quarantined");
                Ok(Disposition::Quarantined(target))
            },
            Err(e) => {
                warn!(%reason, error = ?e, "unable to quarantine file");
                Ok(Disposition::Deferred)
            },
        }
    }

    /// The rendered template path, or the first variant of it that neither
    /// exists in the library nor is claimed by another catalog entry.
    async fn library_path(&self, book: &Book) -> Result<PathBuf> {
        let preferred = PathBuf::from(self.ctx.template.generate_with_ext(book)?);
        for candidate in candidates(&preferred, Some(book.short_hash())) {
            let on_disk = self.ctx.library.exists(&candidate).await.or_raise(|| ErrorKind::Storage)?;
            if on_disk {
                continue;
            }
            let claimed = self
                .ctx
                .catalog
                .path_exists(candidate.to_string_lossy())
                .await
                .or_raise(|| ErrorKind::Catalog)?;
            if !claimed {
                return Ok(candidate);
            }
        }
        exn::bail!(ErrorKind::Placement(preferred))
    }

    /// Quarantined files keep their import-relative path where possible.
    async fn quarantine_path(&self, source: &Path, tag: Option<&str>) -> Result<PathBuf> {
        for candidate in candidates(source, tag) {
            if !self.ctx.quarantine.exists(&candidate).await.or_raise(|| ErrorKind::Storage)? {
                return Ok(candidate);
            }
        }
        exn::bail!(ErrorKind::Placement(source.to_path_buf()))
    }

    /// Delete a book everywhere: search index first, then the catalog, then
    /// the library file. A failure part way never leaves the index pointing
    /// at a book the catalog has dropped; at worst a library file outlives
    /// its catalog entry.
    #[instrument(skip(self))]
    pub async fn remove(&self, hash: &str) -> Result<bool> {
        let Some(book) = self.ctx.catalog.get(hash).await.or_raise(|| ErrorKind::Catalog)? else {
            return Ok(false);
        };
        self.ctx.index.delete(hash).await.or_raise(|| ErrorKind::Index)?;
        self.ctx.catalog.delete(hash).await.or_raise(|| ErrorKind::Catalog)?;
        match self.ctx.library.delete(Path::new(&book.path)).await {
            Ok(()) => {},
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {
                debug!(path = %book.path, "library file already gone");
            },
            Err(e) => {
                warn!(path = %book.path, error = ?e, "removed from the catalog but the library file could not be deleted");
            },
        }
        info!(path = %book.path, "removed from library");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PathGenerator;
    use booksing_catalog::{Database, Repository};
    use booksing_extract::DefaultParser;
    use booksing_extract::models::{Format, Metadata};
    use booksing_search::{MemoryIndex, SearchIndex};
    use booksing_storage::backend::{MockBackend, StorageBackend};

    struct Harness {
        aggregator: Aggregator,
        import: Arc<MockBackend>,
        library: Arc<MockBackend>,
        quarantine: Arc<MockBackend>,
        catalog: Repository,
        index: Arc<MemoryIndex>,
        books: mpsc::Receiver<Book>,
        status: Arc<Status>,
        db: Database,
    }

    async fn harness(files: &[(&str, &[u8])], template: &str) -> Harness {
        let db = Database::connect_in_memory().await.unwrap();
        let import = Arc::new(MockBackend::with_files(files.iter().map(|(p, d)| (*p, d.to_vec()))));
        let library = Arc::new(MockBackend::default().with_name("library"));
        let quarantine = Arc::new(MockBackend::default().with_name("quarantine"));
        let index = Arc::new(MemoryIndex::new());
        let ctx = Context {
            import: import.clone(),
            library: library.clone(),
            quarantine: quarantine.clone(),
            catalog: Repository::from(&db),
            index: index.clone(),
            parser: Arc::new(DefaultParser),
            template: template.parse::<PathGenerator>().unwrap(),
        };
        let (tx, books) = mpsc::channel(16);
        let status = Arc::new(Status::new());
        Harness {
            aggregator: Aggregator::new(Arc::new(ctx), status.clone(), Arc::new(InFlight::new()), tx),
            import,
            library,
            quarantine,
            catalog: Repository::from(&db),
            index,
            books,
            status,
            db,
        }
    }

    fn parsed(path: &str, hash: &str, title: &str) -> ParseResult {
        ParseResult::parsed(path, Book::new(hash, Metadata::new(title, "Frank Herbert", ""), Format::Epub))
    }

    #[tokio::test]
    async fn test_new_book_is_cataloged_and_moved() {
        let mut h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        let disposition = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;

        let Disposition::Added(book) = disposition else {
            panic!("expected the book to be added");
        };
        assert_eq!(book.path, "f/frank-herbert/dune-af1349b9.epub");
        assert_eq!(h.library.read(Path::new(&book.path)).await.unwrap(), b"spice");
        assert!(h.import.paths().await.is_empty());
        assert_eq!(h.catalog.get("af1349b9f5f9").await.unwrap(), Some(book.clone()));
        assert_eq!(h.books.recv().await, Some(book));
        assert_eq!(h.status.snapshot().added, 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_deleted() {
        let mut h = harness(&[("dune.epub", b"spice"), ("copy/dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;
        let disposition = h.aggregator.consume(parsed("copy/dune.epub", "af1349b9f5f9", "Dune")).await;

        assert_eq!(disposition, Disposition::Duplicate);
        assert!(h.import.paths().await.is_empty());
        assert_eq!(h.library.paths().await.len(), 1);
        assert_eq!(h.catalog.count().await.unwrap(), 1);
        h.books.recv().await.unwrap();
        assert!(h.books.try_recv().is_err());
        let snapshot = h.status.snapshot();
        assert_eq!((snapshot.added, snapshot.duplicate), (1, 1));
    }

    #[tokio::test]
    async fn test_duplicate_restores_missing_library_file() {
        let h = harness(&[("dune.epub", b"spice"), ("again.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        let Disposition::Added(book) = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await else {
            panic!("expected the book to be added");
        };
        h.library.delete(Path::new(&book.path)).await.unwrap();

        let disposition = h.aggregator.consume(parsed("again.epub", "af1349b9f5f9", "Dune")).await;
        assert_eq!(disposition, Disposition::Restored(book.clone()));
        assert!(h.library.exists(Path::new(&book.path)).await.unwrap());
        assert!(h.import.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_path_collision_gets_hash_suffix() {
        let h = harness(&[("a.epub", b"first"), ("b.epub", b"second")], "{{ title|slug }}").await;
        let Disposition::Added(first) = h.aggregator.consume(parsed("a.epub", "11111111aaaa", "Dune")).await else {
            panic!("expected the first book to be added");
        };
        let Disposition::Added(second) = h.aggregator.consume(parsed("b.epub", "22222222bbbb", "Dune")).await else {
            panic!("expected the second book to be added");
        };
        assert_eq!(first.path, "dune.epub");
        assert_eq!(second.path, "dune-22222222.epub");
    }

    #[tokio::test]
    async fn test_failed_parse_is_quarantined() {
        let h = harness(&[("sub/broken.epub", b"junk"), ("broken.epub", b"junk2")], crate::DEFAULT_TEMPLATE).await;
        h.quarantine.write(Path::new("broken.epub"), b"older").await.unwrap();

        let disposition = h
            .aggregator
            .consume(ParseResult::failed("sub/broken.epub", Some("deadbeef00".into()), FailureReason::Parse))
            .await;
        assert_eq!(disposition, Disposition::Quarantined(PathBuf::from("sub/broken.epub")));

        let disposition = h
            .aggregator
            .consume(ParseResult::failed("broken.epub", Some("cafebabe00".into()), FailureReason::Parse))
            .await;
        assert_eq!(disposition, Disposition::Quarantined(PathBuf::from("broken-cafebabe.epub")));
        assert_eq!(h.quarantine.read(Path::new("broken.epub")).await.unwrap(), b"older");
        assert!(h.import.paths().await.is_empty());
        assert_eq!(h.catalog.count().await.unwrap(), 0);
        assert_eq!(h.status.snapshot().failed, 2);
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back_catalog() {
        let mut h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        h.library.fail_writes(true);

        let disposition = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;
        assert_eq!(disposition, Disposition::Deferred);
        assert!(!h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert_eq!(h.import.paths().await, [PathBuf::from("dune.epub")]);
        assert!(h.books.try_recv().is_err());
        assert_eq!(h.status.state(), IndexingState::Idle);

        // The next attempt goes through.
        h.library.fail_writes(false);
        let disposition = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;
        assert!(matches!(disposition, Disposition::Added(_)));
    }

    #[tokio::test]
    async fn test_failed_rollback_flags_error() {
        let h = harness(&[("dune.epub", b"spice"), ("messiah.epub", b"water")], crate::DEFAULT_TEMPLATE).await;
        sqlx::query("CREATE TRIGGER keep_books BEFORE DELETE ON books BEGIN SELECT RAISE(ABORT, 'read only'); END")
            .execute(h.db.pool())
            .await
            .unwrap();
        h.library.fail_writes(true);

        let err = h.aggregator.consume_result(parsed("messiah.epub", "22222222bbbb", "Dune Messiah")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Rollback(hash) if hash == "22222222bbbb"));

        let disposition = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;
        assert_eq!(disposition, Disposition::Deferred);
        assert_eq!(h.status.state(), IndexingState::Error);
        assert_eq!(h.status.snapshot().deferred, 1);
        // The row outlives its failed move; the next copy seen restores the file.
        assert!(h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert_eq!(h.import.paths().await.len(), 2);
    }

    #[tokio::test]
    async fn test_copy_left_in_library_flags_error() {
        let h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        // The copy lands, the import file cannot be deleted, and neither can
        // the copy afterwards.
        h.import.fail_deletes(true);
        h.library.fail_deletes(true);

        let disposition = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;
        assert_eq!(disposition, Disposition::Deferred);
        assert!(!h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert_eq!(h.library.paths().await.len(), 1);
        assert_eq!(h.status.state(), IndexingState::Error);
    }

    #[tokio::test]
    async fn test_copy_left_by_failed_move_is_removed() {
        let h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        h.import.fail_deletes(true);

        let disposition = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await;
        assert_eq!(disposition, Disposition::Deferred);
        assert!(!h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert!(h.library.paths().await.is_empty());
        assert_eq!(h.import.paths().await, [PathBuf::from("dune.epub")]);
        assert_eq!(h.status.state(), IndexingState::Idle);
    }

    #[tokio::test]
    async fn test_remove_stops_when_index_delete_fails() {
        let mut h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        let Disposition::Added(book) = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await else {
            panic!("expected the book to be added");
        };
        h.index.batch_upsert(&[h.books.recv().await.unwrap()], true).await.unwrap();
        h.index.fail_deletes(true);

        let err = h.aggregator.remove("af1349b9f5f9").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Index));
        assert!(h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert!(h.library.exists(Path::new(&book.path)).await.unwrap());
        assert!(h.index.get("af1349b9f5f9").await.unwrap().is_some());

        h.index.fail_deletes(false);
        assert!(h.aggregator.remove("af1349b9f5f9").await.unwrap());
        assert!(!h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert_eq!(h.index.get("af1349b9f5f9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_tolerates_undeletable_library_file() {
        let h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        let Disposition::Added(book) = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await else {
            panic!("expected the book to be added");
        };
        h.library.fail_deletes(true);

        assert!(h.aggregator.remove("af1349b9f5f9").await.unwrap());
        assert!(!h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert!(h.library.exists(Path::new(&book.path)).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove() {
        let mut h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        let Disposition::Added(book) = h.aggregator.consume(parsed("dune.epub", "af1349b9f5f9", "Dune")).await else {
            panic!("expected the book to be added");
        };
        h.index.batch_upsert(&[h.books.recv().await.unwrap()], true).await.unwrap();

        assert!(h.aggregator.remove("af1349b9f5f9").await.unwrap());
        assert!(!h.library.exists(Path::new(&book.path)).await.unwrap());
        assert!(!h.catalog.contains("af1349b9f5f9").await.unwrap());
        assert_eq!(h.index.get("af1349b9f5f9").await.unwrap(), None);

        assert!(!h.aggregator.remove("af1349b9f5f9").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_releases_in_flight_paths() {
        let h = harness(&[("dune.epub", b"spice")], crate::DEFAULT_TEMPLATE).await;
        let inflight = h.aggregator.inflight.clone();
        inflight.admit(Path::new("dune.epub"));
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(h.aggregator.run(rx));

        tx.send(Command::Consume(parsed("dune.epub", "af1349b9f5f9", "Dune"))).await.unwrap();
        inflight.drained().await;
        let (reply, answer) = tokio::sync::oneshot::channel();
        tx.send(Command::Remove {
            hash: "0000".into(),
            reply,
        })
        .await
        .unwrap();
        assert!(!answer.await.unwrap().unwrap());
        drop(tx);
        task.await.unwrap();
    }
}
