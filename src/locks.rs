//! Per-user write serialization
//!
//! The stores are plain files with no transactional isolation. Within one
//! process every mutating operation for a user runs under that user's lock,
//! so concurrent requests cannot interleave log appends or draft renames.
//! Separate processes writing the same files are still unsynchronized.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Lock key for the shared account table
pub(crate) const USER_TABLE_KEY: &str = "\0user_info";

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the exclusive lock for `key`.
    ///
    /// The lock is dropped from the map once no other caller holds or waits
    /// on it, so the map only ever holds keys that are in use.
    pub fn with_user<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let result = {
            let lock = Arc::clone(self.locks.entry(key.to_string()).or_default().value());
            // A panic in another writer leaves the files as they were; keep going.
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // the map's own reference is the only one left when nobody else is queued
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
