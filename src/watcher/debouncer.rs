//! Per-path debouncing of filesystem events.
//!
//! Every event refreshes the path's last-seen time. A path settles once no event
//! has touched it for the quiescence window; it is then removed and reported
//! exactly once.

use crate::intake::queue::is_hidden;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use std::time::{Duration, Instant};

/// Pending paths and the time each was last touched.
///
/// Insertion order is kept so paths that settle together come out in the
/// order they were first seen.
#[derive(Debug)]
pub struct PendingRegistry {
    pending: IndexMap<Utf8PathBuf, Instant>,
    window: Duration,
}

impl PendingRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: IndexMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an event for `path` now. Hidden names are refused.
    pub fn record(&mut self, path: Utf8PathBuf) -> bool {
        self.record_at(path, Instant::now())
    }

    pub fn record_at(&mut self, path: Utf8PathBuf, at: Instant) -> bool {
        if is_hidden(&path) {
            return false;
        }
        match self.pending.get_mut(&path) {
            // Events delivered out of order never move the deadline backwards
            Some(last_seen) => *last_seen = (*last_seen).max(at),
            None => {
                self.pending.insert(path, at);
            }
        }
        true
    }

    pub fn take_settled(&mut self) -> Vec<Utf8PathBuf> {
        self.take_settled_at(Instant::now())
    }

    /// Remove and return every path quiet for at least the window as of `now`.
    pub fn take_settled_at(&mut self, now: Instant) -> Vec<Utf8PathBuf> {
        let mut settled = Vec::new();
        let window = self.window;

        self.pending.retain(|path, last_seen| {
            if now.saturating_duration_since(*last_seen) >= window {
                settled.push(path.clone());
                false
            } else {
                true
            }
        });

        settled
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
