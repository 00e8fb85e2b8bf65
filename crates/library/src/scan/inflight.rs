use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Paths that have been handed to the workers but not yet consumed by the
/// aggregator. Keeps a file from being queued twice while it is still being
/// processed, and tells the scanner when a cycle's files are all accounted for.
#[derive(Debug, Default)]
pub struct InFlight {
    paths: Mutex<HashSet<PathBuf>>,
    released: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_paths<T>(&self, f: impl FnOnce(&mut HashSet<PathBuf>) -> T) -> T {
        // A panic while holding the lock cannot leave the set half-updated.
        let mut paths = self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut paths)
    }

    /// Returns `false` if `path` is already in flight.
    pub fn admit(&self, path: &Path) -> bool {
        self.with_paths(|paths| paths.insert(path.to_path_buf()))
    }

    pub fn release(&self, path: &Path) {
        if self.with_paths(|paths| paths.remove(path)) {
            self.released.notify_waiters();
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.with_paths(|paths| paths.contains(path))
    }

    pub fn len(&self) -> usize {
        self.with_paths(|paths| paths.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once nothing is in flight.
    pub async fn drained(&self) {
        self.wait_until(HashSet::is_empty).await
    }

    /// Resolves once none of `paths` is in flight any more. Other paths may
    /// still be.
    pub async fn released(&self, paths: &[PathBuf]) {
        self.wait_until(|inflight| paths.iter().all(|path| !inflight.contains(path))).await
    }

    async fn wait_until(&self, done: impl Fn(&HashSet<PathBuf>) -> bool) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking, so a release in between is not missed.
            notified.as_mut().enable();
            if self.with_paths(|paths| done(paths)) {
                return;
            }
            notified.await;
        }
    }
}
