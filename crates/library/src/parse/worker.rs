use super::{FailureReason, ParseResult};
use crate::aggregate::Command;
use booksing_extract::models::{Book, Format};
use booksing_extract::{ParserHandle, content_hash};
use booksing_storage::BackendHandle;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Read, hash and parse one file from the import directory.
///
/// Never fails: every problem is folded into the [`ParseResult`]. The parser
/// runs on the blocking thread pool.
#[instrument(level = "debug", skip(import, parser), fields(path = %path.display()))]
pub async fn handle(import: &BackendHandle, parser: &ParserHandle, path: PathBuf) -> ParseResult {
    let data = match import.read(&path).await {
        Ok(data) => data,
        Err(e) => {
            warn!(error = ?e, "unable to read file");
            return ParseResult::failed(path, None, FailureReason::Unreadable);
        },
    };
    let hash = content_hash(&data);
    let Some(format) = Format::from_path(&path) else {
        info!(%hash, "unsupported file type");
        return ParseResult::failed(path, Some(hash), FailureReason::Unsupported);
    };
    let parsed = {
        let parser = parser.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || parser.parse(&path, &data)).await
    };
    match parsed {
        Ok(Ok(metadata)) => ParseResult::parsed(path, Book::new(hash, metadata, format)),
        Ok(Err(e)) => {
            let reason = FailureReason::from(&*e);
            info!(%hash, %reason, error = ?e, "parser rejected file");
            ParseResult::failed(path, Some(hash), reason)
        },
        Err(e) => {
            error!(%hash, error = %e, "parser task failed");
            ParseResult::failed(path, Some(hash), FailureReason::Parse)
        },
    }
}

/// Start `count` workers sharing one path queue. Each worker exits once the
/// queue is closed and drained, or once the aggregator has gone away; the
/// result queue closes when the last worker exits.
pub fn spawn_workers(
    count: usize,
    import: BackendHandle,
    parser: ParserHandle,
    paths: mpsc::Receiver<PathBuf>,
    results: mpsc::Sender<Command>,
) -> Vec<JoinHandle<()>> {
    let paths = Arc::new(Mutex::new(paths));
    (0..count)
        .map(|id| tokio::spawn(worker(id, import.clone(), parser.clone(), paths.clone(), results.clone())))
        .collect()
}

async fn worker(
    id: usize,
    import: BackendHandle,
    parser: ParserHandle,
    paths: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    results: mpsc::Sender<Command>,
) {
    loop {
        // Only one idle worker waits on the queue at a time; the lock is
        // released before the file is processed.
        let next = paths.lock().await.recv().await;
        let Some(path) = next else {
            break;
        };
        let result = handle(&import, &parser, path).await;
        if results.send(Command::Consume(result)).await.is_err() {
            warn!(worker = id, "result queue closed; worker exiting");
            break;
        }
    }
    debug!(worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Outcome;
    use booksing_extract::DefaultParser;
    use booksing_storage::backend::MockBackend;

    fn import(files: &[(&str, &[u8])]) -> BackendHandle {
        Arc::new(MockBackend::with_files(files.iter().map(|(p, d)| (*p, d.to_vec()))))
    }

    fn parser() -> ParserHandle {
        Arc::new(DefaultParser)
    }

    #[tokio::test]
    async fn test_handle_parsed() {
        let import = import(&[("Frank Herbert - Dune.pdf", b"%PDF-1.7 spice")]);
        let result = handle(&import, &parser(), PathBuf::from("Frank Herbert - Dune.pdf")).await;
        assert_eq!(result.hash.as_deref(), Some(content_hash(b"%PDF-1.7 spice").as_str()));
        let Outcome::Parsed(book) = result.outcome else {
            panic!("expected a parsed book");
        };
        assert_eq!((book.title.as_str(), book.author.as_str()), ("Dune", "Frank Herbert"));
        assert_eq!(book.format, Format::Pdf);
        assert_eq!(book.path, "");
    }

    #[tokio::test]
    async fn test_handle_keeps_hash_on_parse_failure() {
        let import = import(&[("broken.epub", b"not a zip")]);
        let result = handle(&import, &parser(), PathBuf::from("broken.epub")).await;
        assert_eq!(result, ParseResult::failed("broken.epub", Some(content_hash(b"not a zip")), FailureReason::Parse));
    }

    #[tokio::test]
    async fn test_handle_unsupported() {
        let import = import(&[("notes.docx", b"PK")]);
        let result = handle(&import, &parser(), PathBuf::from("notes.docx")).await;
        assert_eq!(result.outcome, Outcome::Failed(FailureReason::Unsupported));
        assert!(result.hash.is_some());
    }

    #[tokio::test]
    async fn test_handle_unreadable() {
        let import = import(&[]);
        let result = handle(&import, &parser(), PathBuf::from("gone.epub")).await;
        assert_eq!(result, ParseResult::failed("gone.epub", None, FailureReason::Unreadable));
    }

    #[tokio::test]
    async fn test_workers_drain_queue_then_close_results() {
        let files: Vec<(String, Vec<u8>)> = (0..7).map(|i| (format!("Author - Book {i}.txt"), vec![i])).collect();
        let import: BackendHandle = Arc::new(MockBackend::with_files(files.clone()));
        let (path_tx, path_rx) = mpsc::channel(2);
        let (result_tx, mut result_rx) = mpsc::channel(2);
        let workers = spawn_workers(3, import, parser(), path_rx, result_tx);
        assert_eq!(workers.len(), 3);
        tokio::spawn(async move {
            for (path, _) in files {
                path_tx.send(PathBuf::from(path)).await.unwrap();
            }
        });
        let mut titles = Vec::new();
        while let Some(Command::Consume(result)) = result_rx.recv().await {
            let Outcome::Parsed(book) = result.outcome else {
                panic!("expected a parsed book");
            };
            assert_eq!(book.author, "Author");
            titles.push(book.title);
        }
        titles.sort();
        assert_eq!(titles.len(), 7);
        assert_eq!(titles[0], "Book 0");
        for worker in workers {
            worker.await.unwrap();
        }
    }
}
