//! Keyed async mutexes that are dropped from the map once nobody holds or
//! awaits them.
//!
//! The booking service locks per `(teacher, day)` and per booking id. Both key
//! spaces are unbounded, so an entry lives only while a guard for it (or a
//! task queued on it) exists.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    entries: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        KeyedLocks {
            entries: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let mutex = Arc::clone(self.entries.entry(key.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn release(&self, key: &K) {
        // The map's own reference is the only one left once every guard and
        // waiter is gone. `remove_if` holds the shard lock, so a concurrent
        // `lock` either sees the old entry (and bumps the count first) or
        // creates a fresh one.
        self.entries
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Exclusive access to one key. The entry is cleaned up on drop.
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        // Release the mutex (and its Arc) before checking the count.
        self.guard.take();
        self.locks.release(&self.key);
    }
}
