//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and loads.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of reads served from a stored value
    pub hits: u64,
    /// Number of reads that found nothing usable
    pub misses: u64,
    /// Number of loads and refreshes that produced a value
    pub load_successes: u64,
    /// Number of loads and refreshes that failed
    pub load_failures: u64,
    /// Time spent inside successful and failed loads, in nanoseconds
    pub total_load_time_nanos: u64,
    /// Number of background refreshes started
    pub refreshes: u64,
    /// Number of expired entries removed by sweeps
    pub expirations: u64,
    /// Approximate number of entries held by this cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Mean load duration in nanoseconds, or 0.0 before the first load.
    pub fn average_load_penalty_nanos(&self) -> f64 {
        let loads = self.load_successes + self.load_failures;
        if loads == 0 {
            0.0
        } else {
            self.total_load_time_nanos as f64 / loads as f64
        }
    }
}

// == Stats Counter ==
/// Lock-free counters updated from concurrent cache operations.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    total_load_time_nanos: AtomicU64,
    refreshes: AtomicU64,
    expirations: AtomicU64,
    entries: AtomicUsize,
}

impl StatsCounter {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_success(&self, elapsed_nanos: u64) {
        self.load_successes.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_nanos
            .fetch_add(elapsed_nanos, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self, elapsed_nanos: u64) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_nanos
            .fetch_add(elapsed_nanos, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn entry_added(&self) {
        self.entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entry_removed(&self) {
        // Saturate: racing puts and removes may briefly undercount.
        let _ = self
            .entries
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            total_load_time_nanos: self.total_load_time_nanos.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            total_entries: self.entries(),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsCounter::default().snapshot();
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let counter = StatsCounter::default();
        counter.record_hit();
        counter.record_hit();
        counter.record_hit();
        assert_eq!(counter.snapshot().hit_rate(), 1.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counter = StatsCounter::default();
        counter.record_hit();
        counter.record_miss();
        assert_eq!(counter.snapshot().hit_rate(), 0.5);
    }

    #[test]
    fn test_load_penalty() {
        let counter = StatsCounter::default();
        counter.record_load_success(100);
        counter.record_load_failure(300);

        let stats = counter.snapshot();
        assert_eq!(stats.load_successes, 1);
        assert_eq!(stats.load_failures, 1);
        assert_eq!(stats.average_load_penalty_nanos(), 200.0);
    }

    #[test]
    fn test_entry_count_never_underflows() {
        let counter = StatsCounter::default();
        counter.entry_removed();
        assert_eq!(counter.entries(), 0);

        counter.entry_added();
        counter.entry_added();
        counter.entry_removed();
        assert_eq!(counter.entries(), 1);
    }

    #[test]
    fn test_expirations_accumulate() {
        let counter = StatsCounter::default();
        counter.record_expirations(2);
        counter.record_expirations(3);
        assert_eq!(counter.snapshot().expirations, 5);
    }
}
