//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::{Deserialize, Serialize};

// == Stats Collector ==
/// Cumulative counters updated as a side effect of store operations.
///
/// Counters survive `clear()`; only a new store starts from zero.
#[derive(Debug, Clone, Default)]
pub struct StatsCollector {
    hits: u64,
    misses: u64,
    evictions: u64,
    last_cleanup_at: Option<u64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Marks the time (Unix milliseconds) of the latest expiry sweep.
    pub fn record_cleanup(&mut self, at: u64) {
        self.last_cleanup_at = Some(at);
    }

    // == Snapshot ==
    /// Builds a stats report for the given store occupancy.
    pub fn snapshot(&self, total_entries: usize, total_size_bytes: usize, max_size_bytes: usize) -> CacheStats {
        let observations = self.hits + self.misses;
        let (hit_rate, miss_rate) = if observations == 0 {
            (0.0, 0.0)
        } else {
            (
                self.hits as f64 / observations as f64 * 100.0,
                self.misses as f64 / observations as f64 * 100.0,
            )
        };
        let memory_utilization_pct = if max_size_bytes == 0 {
            0.0
        } else {
            total_size_bytes as f64 / max_size_bytes as f64 * 100.0
        };

        CacheStats {
            total_entries,
            total_size_bytes,
            hit_count: self.hits,
            miss_count: self.misses,
            eviction_count: self.evictions,
            last_cleanup_at: self.last_cleanup_at,
            hit_rate,
            miss_rate,
            memory_utilization_pct,
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of cache performance. Rates are percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    /// Unix milliseconds of the last expiry sweep, if any ran
    pub last_cleanup_at: Option<u64>,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub memory_utilization_pct: f64,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsCollector::new().snapshot(0, 0, 100);
        assert_eq!(stats.hit_count, 0);
        assert_eq!(stats.miss_count, 0);
        assert_eq!(stats.eviction_count, 0);
        assert!(stats.last_cleanup_at.is_none());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = StatsCollector::new().snapshot(0, 0, 100);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.miss_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let mut collector = StatsCollector::new();
        collector.record_hit();
        collector.record_hit();
        collector.record_hit();
        assert_eq!(collector.snapshot(0, 0, 100).hit_rate, 100.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut collector = StatsCollector::new();
        collector.record_hit();
        collector.record_miss();
        collector.record_miss();
        collector.record_miss();

        let stats = collector.snapshot(0, 0, 100);
        assert_eq!(stats.hit_rate, 25.0);
        assert_eq!(stats.miss_rate, 75.0);
    }

    #[test]
    fn test_memory_utilization() {
        let stats = StatsCollector::new().snapshot(3, 250, 1000);
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 250);
        assert_eq!(stats.memory_utilization_pct, 25.0);
    }

    #[test]
    fn test_record_eviction_and_cleanup() {
        let mut collector = StatsCollector::new();
        collector.record_eviction();
        collector.record_eviction();
        collector.record_cleanup(42);

        let stats = collector.snapshot(0, 0, 100);
        assert_eq!(stats.eviction_count, 2);
        assert_eq!(stats.last_cleanup_at, Some(42));
    }
}
