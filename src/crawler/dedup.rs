//! Run-scoped record deduplication

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Tracks identifiers seen during one run
///
/// Checking and marking happen under one lock acquisition, so two workers
/// racing on the same identifier can never both see it as new.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from identifiers already known, e.g. from earlier exports
    pub fn with_seen<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            seen: Mutex::new(ids.into_iter().collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding the lock cannot leave the set half-updated
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seen(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn mark_seen(&self, id: &str) {
        self.lock().insert(id.to_string());
    }

    /// Marks `id` as seen; returns true if it was not seen before
    pub fn check_and_mark(&self, id: &str) -> bool {
        let mut seen = self.lock();
        if seen.contains(id) {
            return false;
        }
        seen.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
