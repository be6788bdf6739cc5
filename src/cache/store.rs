//! Backing Store Module
//!
//! The pluggable associative store that physically holds cache entries, and
//! the in-memory implementation used by default.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cache::CacheEntry;

// == Backing Store ==
/// Storage for cache entries, keyed by already-namespaced strings.
///
/// Each call must be atomic on its own; nothing is assumed across calls.
pub trait BackingStore<V>: Send + Sync {
    /// Returns a handle to the entry stored under `key`.
    fn get(&self, key: &str) -> Option<CacheEntry<V>>;

    /// Stores `entry`, replacing any previous one. Returns `true` if the key
    /// was not present before.
    fn set(&self, key: &str, entry: CacheEntry<V>) -> bool;

    /// Stores `entry` only if `key` is absent. Returns `true` if it was stored.
    fn add(&self, key: &str, entry: CacheEntry<V>) -> bool;

    /// Removes `key`. Returns `true` if it was present.
    fn remove(&self, key: &str) -> bool;

    /// Lists every stored key starting with `prefix`.
    fn keys(&self, prefix: &str) -> Vec<String>;
}

// == Memory Store ==
/// HashMap storage behind a read-write lock.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of stored entries across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BackingStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, entry: CacheEntry<V>) -> bool {
        self.entries.write().insert(key.to_string(), entry).is_none()
    }

    fn add(&self, key: &str, entry: CacheEntry<V>) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), entry);
        true
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn keys(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}
