use super::{InFlight, is_candidate};
use crate::error::{ErrorKind, Result};
use crate::status::{IndexingState, Status, StatusSnapshot};
use booksing_storage::BackendHandle;
use exn::ResultExt;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Clears the "cycle running" flag however the cycle ends.
struct CycleGuard<'a>(&'a AtomicBool);
impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).ok().map(|_| Self(flag))
    }
}
impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Walks the import directory and queues every candidate file that is not
/// already being processed.
///
/// A cycle lasts until the aggregator has consumed every file the cycle
/// queued, so the [`Status`] counters read afterwards describe exactly that
/// cycle. A file that takes longer than `cycle_timeout` does not hold the
/// cycle up: it stays in flight (and out of later cycles) and is counted by
/// whichever cycle is running when it is finally consumed.
///
/// Only one cycle runs at a time; asking for another while one is running
/// does nothing.
pub struct Scanner {
    import: BackendHandle,
    recursive: bool,
    cycle_timeout: Duration,
    sender: Mutex<Option<mpsc::Sender<PathBuf>>>,
    inflight: Arc<InFlight>,
    status: Arc<Status>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(
        import: BackendHandle,
        recursive: bool,
        cycle_timeout: Duration,
        sender: mpsc::Sender<PathBuf>,
        inflight: Arc<InFlight>,
        status: Arc<Status>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            import,
            recursive,
            cycle_timeout,
            sender: Mutex::new(Some(sender)),
            inflight,
            status,
            running: AtomicBool::new(false),
            cancel,
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<PathBuf>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Drop the path queue sender so the workers wind down once they have
    /// drained it. No further cycles can run afterwards.
    pub fn close(&self) {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one scan cycle to completion.
    ///
    /// Returns `None` without doing anything if a cycle is already running,
    /// otherwise the status at the end of this cycle. A listing failure ends
    /// the cycle early (files already queued are still seen through), leaves
    /// the state at [`IndexingState::Error`] and is returned as an error.
    #[instrument(skip(self), fields(import = self.import.name()))]
    pub async fn refresh_cycle(&self) -> Result<Option<StatusSnapshot>> {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            debug!("scan cycle already running");
            return Ok(None);
        };
        let Some(sender) = self.sender() else {
            exn::bail!(ErrorKind::Closed);
        };
        self.status.begin_cycle();
        let mut admitted = Vec::new();
        let listed = self.enqueue(&sender, &mut admitted).await;
        drop(sender);
        self.settle(&admitted).await;
        if listed.is_err() {
            self.status.set_state(IndexingState::Error);
        }
        self.status.end_cycle();
        let snapshot = self.status.snapshot();
        listed?;
        info!(
            queued = admitted.len(),
            added = snapshot.added,
            duplicate = snapshot.duplicate,
            failed = snapshot.failed,
            deferred = snapshot.deferred,
            "scan cycle complete"
        );
        Ok(Some(snapshot))
    }

    /// Wait for the files this cycle queued, up to `cycle_timeout`.
    async fn settle(&self, admitted: &[PathBuf]) {
        tokio::select! {
            _ = self.inflight.released(admitted) => {},
            _ = tokio::time::sleep(self.cycle_timeout) => {
                let pending = admitted.iter().filter(|path| self.inflight.contains(path)).count();
                warn!(pending, timeout = ?self.cycle_timeout, "files still being processed; ending scan cycle without them");
            },
            _ = self.cancel.cancelled() => {
                debug!(remaining = self.inflight.len(), "scan cycle interrupted by shutdown");
            },
        }
    }

    /// Queue every candidate, recording what was queued in `admitted` even
    /// when the listing fails part way.
    async fn enqueue(&self, sender: &mpsc::Sender<PathBuf>, admitted: &mut Vec<PathBuf>) -> Result<()> {
        let mut files = self.import.list_stream(None);
        while let Some(entry) = files.next().await {
            let file = entry.or_raise(|| ErrorKind::Listing)?;
            if (!self.recursive && !file.is_top_level()) || !is_candidate(&file.path) {
                continue;
            }
            if !self.inflight.admit(&file.path) {
                debug!(path = %file.path.display(), "already in flight");
                continue;
            }
            tokio::select! {
                sent = sender.send(file.path.clone()) => if sent.is_err() {
                    self.inflight.release(&file.path);
                    exn::bail!(ErrorKind::Closed);
                },
                _ = self.cancel.cancelled() => {
                    self.inflight.release(&file.path);
                    break;
                },
            }
            admitted.push(file.path);
        }
        Ok(())
    }

    /// Run a cycle every `period` (the first one immediately) until cancelled,
    /// then close the path queue.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_cycle().await {
                        warn!(error = ?e, "scan cycle failed; retrying next cycle");
                    }
                },
            }
        }
        self.close();
        debug!("scanner stopped");
    }
}
