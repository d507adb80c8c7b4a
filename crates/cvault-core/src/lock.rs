//! Keyed exclusive locks: get-or-create a `Semaphore(1)` per string key.
//!
//! Used to serialize per-resource operations such as "don't run two
//! folder-size requests for the same uuid concurrently". Locks are
//! created lazily and kept for the lifetime of the manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::semaphore::Semaphore;

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the exclusive lock for `key`, creating it on first use.
    pub fn get(&self, key: &str) -> Arc<Semaphore> {
        let mut locks = self.locks.lock().expect("keyed locks poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Purge every lock's waiters (teardown). Returns total waiters
    /// rejected across all keys.
    pub fn purge_all(&self) -> usize {
        let locks = self.locks.lock().expect("keyed locks poisoned");
        locks.values().map(|sem| sem.purge()).sum()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().expect("keyed locks poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
