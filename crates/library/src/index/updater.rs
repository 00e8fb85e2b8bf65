use super::dedup_by_hash;
use crate::error::{Error, ErrorKind, Result};
use booksing_extract::models::Book;
use booksing_search::{SearchHandle, TaskId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Ask the updater to flush whatever it holds right now.
#[derive(Debug)]
pub struct FlushRequest {
    /// Wait until the search index reports the batch as processed.
    pub wait: bool,
    /// The last task id, or `None` if there was nothing to flush.
    pub reply: oneshot::Sender<Result<Option<TaskId>>>,
}

/// Buffers accepted books and writes them to the search index in batches of
/// at most `batch_size`, whenever a batch fills up or `save_interval` passes
/// without a flush.
///
/// A batch the index rejects is logged and dropped; the catalog still has the
/// books and a reindex puts them back.
pub struct IndexUpdater {
    index: SearchHandle,
    batch_size: usize,
    save_interval: Duration,
    buffer: Vec<Book>,
}

impl IndexUpdater {
    pub fn new(index: SearchHandle, batch_size: usize, save_interval: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            index,
            batch_size,
            save_interval,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffer a book; returns `true` once a full batch is waiting.
    pub fn push(&mut self, book: Book) -> bool {
        self.buffer.push(book);
        self.buffer.len() >= self.batch_size
    }

    /// Send the buffer to the index, deduplicated and split into batches.
    ///
    /// The buffer is emptied whether or not the index accepts it. Returns the
    /// task id of the last batch, or the first error.
    #[instrument(level = "debug", skip(self), fields(index = self.index.name(), buffered = self.buffer.len()))]
    pub async fn flush(&mut self, wait: bool) -> Result<Option<TaskId>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let books = dedup_by_hash(std::mem::take(&mut self.buffer));
        let mut last_task = None;
        let mut first_error: Option<Error> = None;
        for batch in books.chunks(self.batch_size) {
            match self.index.batch_upsert(batch, wait).await {
                Ok(task) => {
                    info!(count = batch.len(), task, "flushed books to search index");
                    last_task = Some(task);
                },
                Err(e) => {
                    warn!(count = batch.len(), error = ?e, "search index rejected batch; reindex to recover");
                    if first_error.is_none() {
                        first_error = Some(e.raise(ErrorKind::Index));
                    }
                },
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(last_task),
        }
    }

    async fn flush_logged(&mut self) {
        // Failures are already logged per batch.
        _ = self.flush(false).await;
    }

    /// Run until the book queue closes, then flush one last time.
    ///
    /// Pending flush requests are served ahead of the timer, and only after
    /// every book already queued has been buffered.
    pub async fn run(mut self, mut books: mpsc::Receiver<Book>, mut flushes: mpsc::Receiver<FlushRequest>) {
        let mut deadline = Instant::now() + self.save_interval;
        loop {
            tokio::select! {
                biased;
                Some(request) = flushes.recv() => {
                    while let Ok(book) = books.try_recv() {
                        self.buffer.push(book);
                    }
                    let result = self.flush(request.wait).await;
                    _ = request.reply.send(result);
                    deadline = Instant::now() + self.save_interval;
                },
                book = books.recv() => match book {
                    Some(book) => if self.push(book) {
                        self.flush_logged().await;
                        deadline = Instant::now() + self.save_interval;
                    },
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    self.flush_logged().await;
                    deadline = Instant::now() + self.save_interval;
                },
            }
        }
        self.flush_logged().await;
        debug!("index updater stopped");
    }
}
