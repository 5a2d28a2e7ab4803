//! Keyed mutual exclusion.
//!
//! Each key gets its own lock slot, created on demand and dropped again once
//! nobody holds or waits for it, so the table only grows with concurrency and
//! not with the number of keys ever seen.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &K, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let slot = {
            let mut slots = self.slots.lock().map_err(|_| Error::LockPoisoned)?;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = slot.lock().map_err(|_| Error::LockPoisoned)?;
            f()
        };

        // Clones are only taken under the table lock, so the count is stable here
        let mut slots = self.slots.lock().map_err(|_| Error::LockPoisoned)?;
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }

        result
    }

    /// Number of keys currently held or awaited
    pub fn active(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}
