use crate::Context;
use crate::aggregate::{Aggregator, Command};
use crate::error::{ErrorKind, Result};
use crate::index::{FlushRequest, IndexUpdater};
use crate::parse::spawn_workers;
use crate::scan::{InFlight, Scanner};
use crate::status::{Status, StatusSnapshot};
use booksing_search::TaskId;
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Parser workers.
    pub workers: usize,
    /// Maximum books per search index request.
    pub batch_size: usize,
    /// Longest a buffered book waits for the search index.
    pub save_interval: Duration,
    /// Scan the import directory this often. With `None` cycles only run
    /// through [`Pipeline::refresh`].
    pub scan_interval: Option<Duration>,
    /// Longest a scan cycle waits for its files to be consumed. Files still
    /// being parsed after that stay in flight and are not queued again.
    pub cycle_timeout: Duration,
    /// Descend into subdirectories of the import directory.
    pub recursive: bool,
    /// Capacity of the path and result queues.
    pub queue_capacity: usize,
    /// Capacity of the book queue in front of the index updater. The
    /// aggregator waits when it is full.
    pub index_buffer: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 5,
            batch_size: 50,
            save_interval: Duration::from_secs(10),
            scan_interval: Some(Duration::from_secs(60)),
            cycle_timeout: Duration::from_secs(60),
            recursive: true,
            queue_capacity: 64,
            index_buffer: 1000,
        }
    }
}

/// A running pipeline: one scanner, a pool of parser workers, one aggregator
/// and one index updater, each on its own task.
pub struct Pipeline {
    scanner: Arc<Scanner>,
    status: Arc<Status>,
    commands: mpsc::Sender<Command>,
    flushes: mpsc::Sender<FlushRequest>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn every stage. Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(workers = options.workers, import = ctx.import.name()))]
    pub fn start(ctx: Context, options: PipelineOptions) -> Self {
        let ctx = Arc::new(ctx);
        let status = Arc::new(Status::new());
        let inflight = Arc::new(InFlight::new());
        let cancel = CancellationToken::new();

        let capacity = options.queue_capacity.max(1);
        let (path_tx, path_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (book_tx, book_rx) = mpsc::channel(options.index_buffer.max(1));
        let (flush_tx, flush_rx) = mpsc::channel(1);

        let scanner = Arc::new(Scanner::new(
            ctx.import.clone(),
            options.recursive,
            options.cycle_timeout,
            path_tx,
            inflight.clone(),
            status.clone(),
            cancel.clone(),
        ));
        let mut tasks = spawn_workers(
            options.workers.max(1),
            ctx.import.clone(),
            ctx.parser.clone(),
            path_rx,
            command_tx.clone(),
        );
        let aggregator = Aggregator::new(ctx.clone(), status.clone(), inflight, book_tx);
        tasks.push(tokio::spawn(aggregator.run(command_rx)));
        let updater = IndexUpdater::new(ctx.index.clone(), options.batch_size, options.save_interval);
        tasks.push(tokio::spawn(updater.run(book_rx, flush_rx)));
        if let Some(period) = options.scan_interval {
            tasks.push(tokio::spawn(scanner.clone().run(period)));
        }
        info!(scan_interval = ?options.scan_interval, "pipeline started");

        Self {
            scanner,
            status,
            commands: command_tx,
            flushes: flush_tx,
            cancel,
            tasks,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Run a scan cycle now and wait for it to finish. `None` if a cycle was
    /// already running.
    pub async fn refresh(&self) -> Result<Option<StatusSnapshot>> {
        self.scanner.refresh_cycle().await
    }

    /// Flush every book accepted so far to the search index.
    pub async fn flush(&self, wait: bool) -> Result<Option<TaskId>> {
        let (reply, answer) = oneshot::channel();
        if self.flushes.send(FlushRequest { wait, reply }).await.is_err() {
            exn::bail!(ErrorKind::Closed);
        }
        answer.await.or_raise(|| ErrorKind::Closed)?
    }

    /// Remove a book from the library, the catalog and the search index.
    /// Returns `false` if it is not cataloged.
    pub async fn remove(&self, hash: impl Into<String>) -> Result<bool> {
        let (reply, answer) = oneshot::channel();
        let command = Command::Remove {
            hash: hash.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            exn::bail!(ErrorKind::Closed);
        }
        answer.await.or_raise(|| ErrorKind::Closed)?
    }

    /// Cancelling the token stops the pipeline the same way
    /// [`shutdown`](Self::shutdown) does, minus the waiting.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop scanning, let the workers and the aggregator finish the files
    /// already queued, flush the index buffer and wait for every task.
    /// Files that were never queued stay in the import directory.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            scanner,
            commands,
            flushes,
            cancel,
            tasks,
            ..
        } = self;
        cancel.cancel();
        scanner.close();
        drop(commands);
        drop(flushes);
        let mut failed = 0;
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "pipeline task did not finish cleanly");
                failed += 1;
            }
        }
        if failed > 0 {
            exn::bail!(ErrorKind::Task);
        }
        info!("pipeline stopped");
        Ok(())
    }
}
