//! Per-key mutual exclusion.
//!
//! Writers for the same key (a date, a goal id) run one at a time, while
//! writers for different keys never wait on each other.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A set of held keys with a condition variable to wait for release.
#[derive(Debug)]
pub struct KeyedLock<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<K>> {
        // The set is only mutated by insert/remove, so it stays valid after a panic
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `key` is free, then holds it until the guard drops.
    pub fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let mut held = self.held();
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.clone());
        KeyGuard {
            lock: self,
            keys: vec![key],
        }
    }

    /// Holds every key in `keys` at once.
    ///
    /// Waits until none of the keys is held and takes them together, so two
    /// callers with overlapping sets cannot deadlock.
    pub fn lock_all(&self, keys: impl IntoIterator<Item = K>) -> KeyGuard<'_, K>
    where
        K: Ord,
    {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut held = self.held();
        while keys.iter().any(|k| held.contains(k)) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.extend(keys.iter().cloned());
        KeyGuard { lock: self, keys }
    }

    /// Returns true if `key` is currently held.
    #[cfg(test)]
    pub fn is_locked(&self, key: &K) -> bool {
        self.held().contains(key)
    }
}

/// Releases its keys on drop.
#[derive(Debug)]
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    lock: &'a KeyedLock<K>,
    keys: Vec<K>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        let mut held = self.lock.held();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.lock.released.notify_all();
    }
}
