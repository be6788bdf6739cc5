//! Cache Entry Module
//!
//! Defines the record stored per key: its value reference and timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::{CachePolicy, ValueReference};

// == Cache Entry ==
/// Represents a single cache entry with its value reference and metadata.
///
/// Clones share the access timestamp, so a read recorded on a clone handed out
/// by the backing store is visible to every later reader of that entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The caller-facing key (without namespace)
    key: String,
    /// Current state of the stored value
    value_ref: ValueReference<V>,
    /// Last read or write, monotonic nanoseconds
    access_time: Arc<AtomicU64>,
    /// Last write, monotonic nanoseconds
    write_time: u64,
}

impl<V: Clone> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry with both timestamps set to `now`.
    pub fn new(key: impl Into<String>, value_ref: ValueReference<V>, now: u64) -> Self {
        Self {
            key: key.into(),
            value_ref,
            access_time: Arc::new(AtomicU64::new(now)),
            write_time: now,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value_reference(&self) -> &ValueReference<V> {
        &self.value_ref
    }

    pub fn set_value_reference(&mut self, value_ref: ValueReference<V>) {
        self.value_ref = value_ref;
    }

    pub fn access_time(&self) -> u64 {
        self.access_time.load(Ordering::Acquire)
    }

    pub fn write_time(&self) -> u64 {
        self.write_time
    }

    // == Bookkeeping ==
    /// Stamps a read when access expiry is enabled. Takes `&self`: safe to call
    /// from the lock-free read path.
    pub fn record_read(&self, policy: &CachePolicy, now: u64) {
        if policy.records_access() {
            self.access_time.fetch_max(now, Ordering::AcqRel);
        }
    }

    /// Stamps a write when write expiry or refresh is enabled. A write also
    /// counts as an access.
    pub fn record_write(&mut self, policy: &CachePolicy, now: u64) {
        if policy.records_write() {
            self.write_time = now;
        }
        self.record_read(policy, now);
    }

    // == Expiry ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once the full interval has
    /// elapsed, i.e. when `now - stamp >= interval`.
    pub fn is_expired(&self, policy: &CachePolicy, now: u64) -> bool {
        let elapsed_since = |stamp: u64| now.saturating_sub(stamp) as u128;

        let access_ttl = policy.expire_after_access();
        if !access_ttl.is_zero() && elapsed_since(self.access_time()) >= access_ttl.as_nanos() {
            return true;
        }

        let write_ttl = policy.expire_after_write();
        !write_ttl.is_zero() && elapsed_since(self.write_time) >= write_ttl.as_nanos()
    }

    /// True when a background refresh is due at `now`.
    pub fn needs_refresh(&self, policy: &CachePolicy, now: u64) -> bool {
        let refresh = policy.refresh_after_write();
        !refresh.is_zero()
            && now.saturating_sub(self.write_time) as u128 >= refresh.as_nanos()
    }
}
