//! Short-lived correlation tokens.
//!
//! A [`TokenCache`] maps opaque tokens (login codes, download links, ...) to
//! whatever they identify, for a limited time. Expired entries are never
//! returned; they are dropped lazily on access and in bulk by
//! [`TokenCache::purge_expired`], which [`TokenCache::run_purger`] calls
//! periodically.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires: Instant,
}
impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires > now
    }
}

/// Concurrent token → value map with a per-entry time to live.
#[derive(Debug)]
pub struct TokenCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TokenCache<V> {
    /// Entries inserted with [`insert`](Self::insert) live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `token`, replacing any previous entry. Returns the
    /// replaced value if it had not expired yet.
    pub fn insert(&self, token: impl Into<String>, value: V) -> Option<V> {
        self.insert_with_ttl(token, value, self.ttl)
    }

    pub fn insert_with_ttl(&self, token: impl Into<String>, value: V, ttl: Duration) -> Option<V> {
        let now = Instant::now();
        let entry = Entry {
            value,
            expires: now + ttl,
        };
        self.entries
            .insert(token.into(), entry)
            .filter(|previous| previous.is_live(now))
            .map(|previous| previous.value)
    }

    /// The value behind a live token.
    pub fn get(&self, token: &str) -> Option<V> {
        let now = Instant::now();
        // The read guard must be gone before an expired entry is removed.
        let found = self.entries.get(token).map(|entry| entry.is_live(now).then(|| entry.value.clone()));
        match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove_if(token, |_, entry| !entry.is_live(now));
                None
            },
            None => None,
        }
    }

    /// Redeem a token: remove it and return its value if it was still live.
    /// A token can be taken at most once.
    pub fn take(&self, token: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(token)
            .and_then(|(_, entry)| entry.is_live(now).then_some(entry.value))
    }

    /// Drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Purge every `period` until cancelled.
    pub async fn run_purger(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        trace!(purged, remaining = self.len(), "purged expired tokens");
                    }
                },
            }
        }
        debug!("token purger stopped");
    }
}
