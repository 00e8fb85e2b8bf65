//! Indexing state and per-cycle counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingState {
    Idle,
    Indexing,
    /// The last cycle could not list the import directory, or the catalog
    /// and library may have diverged. Cleared by the next successful cycle.
    Error,
}
impl IndexingState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => IndexingState::Indexing,
            2 => IndexingState::Error,
            _ => IndexingState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            IndexingState::Idle => 0,
            IndexingState::Indexing => 1,
            IndexingState::Error => 2,
        }
    }
}

/// The kinds of per-file outcome a cycle counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Cataloged and moved into the library.
    Added,
    /// Already cataloged; the copy was removed from the import directory.
    Duplicate,
    /// Rejected by the parser and moved to quarantine.
    Failed,
    /// Left in the import directory for the next cycle.
    Deferred,
}

/// Shared, lock-free pipeline status. Written by the scanner (state) and the
/// aggregator (counters), read by anyone holding the pipeline handle.
#[derive(Debug, Default)]
pub struct Status {
    state: AtomicU8,
    added: AtomicU64,
    duplicate: AtomicU64,
    failed: AtomicU64,
    deferred: AtomicU64,
    cycles: AtomicU64,
}

/// Point-in-time copy of [`Status`], suitable for a status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub state: IndexingState,
    pub added: u64,
    pub duplicate: u64,
    pub failed: u64,
    pub deferred: u64,
    /// Completed scan cycles since startup.
    pub cycles: u64,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IndexingState {
        IndexingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: IndexingState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Reset the counters and mark a cycle as running.
    pub(crate) fn begin_cycle(&self) {
        for counter in [&self.added, &self.duplicate, &self.failed, &self.deferred] {
            counter.store(0, Ordering::SeqCst);
        }
        self.set_state(IndexingState::Indexing);
    }

    /// Back to idle, unless something flagged an error during the cycle.
    pub(crate) fn end_cycle(&self) {
        _ = self.state.compare_exchange(
            IndexingState::Indexing.as_u8(),
            IndexingState::Idle.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment(&self, counter: Counter) {
        let atomic = match counter {
            Counter::Added => &self.added,
            Counter::Duplicate => &self.duplicate,
            Counter::Failed => &self.failed,
            Counter::Deferred => &self.deferred,
        };
        atomic.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            added: self.added.load(Ordering::SeqCst),
            duplicate: self.duplicate.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            deferred: self.deferred.load(Ordering::SeqCst),
            cycles: self.cycles.load(Ordering::SeqCst),
        }
    }
}
