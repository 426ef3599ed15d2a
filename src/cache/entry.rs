//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, access
//! tracking, tags and eviction metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Priority ==
/// Eviction priority of an entry. Lower ranks are evicted first under the
/// `priority` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used for ordering: low=0, medium=1, high=2.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

// == Set Options ==
/// Per-entry options accepted by `set`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// TTL in milliseconds; `None` uses the configured default
    pub ttl: Option<u64>,
    pub tags: Vec<String>,
    pub priority: Priority,
    /// Whether the entry is written to durable snapshots
    pub persistent: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl = Some(ttl_ms);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    /// The stored value, opaque to the cache
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Time to live in milliseconds
    pub ttl: u64,
    pub access_count: u64,
    /// Last read timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Estimated serialized size
    pub size_bytes: usize,
    pub tags: BTreeSet<String>,
    pub priority: Priority,
    pub persistent: bool,
    /// Store-assigned insertion order, used as the eviction tie-break
    pub(crate) insertion_seq: u64,
    /// Store-assigned access order, strictly increasing per touch
    pub(crate) access_seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    pub fn new(key: String, value: Value, ttl: u64, size_bytes: usize, options: &SetOptions) -> Self {
        let now = current_timestamp_ms();
        Self {
            key,
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
            size_bytes,
            tags: options.tags.iter().cloned().collect(),
            priority: options.priority,
            persistent: options.persistent,
            insertion_seq: 0,
            access_seq: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// An entry is expired once strictly more than `ttl` milliseconds have
    /// passed since creation.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.ttl
    }

    /// Absolute expiry timestamp (Unix milliseconds).
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at().saturating_sub(current_timestamp_ms())
    }

    /// Records a read.
    pub(crate) fn touch(&mut self, now: u64, access_seq: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_seq = access_seq;
    }

    /// Persistent high-priority entries are evicted only as a last resort.
    pub fn is_protected(&self) -> bool {
        self.persistent && self.priority == Priority::High
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    fn entry_with_ttl(ttl: u64) -> CacheEntry {
        CacheEntry::new("k".to_string(), json!("v"), ttl, 4, &SetOptions::new())
    }

    #[test]
    fn test_entry_creation() {
        let options = SetOptions::new()
            .tags(["a", "b"])
            .priority(Priority::High)
            .persistent(true);
        let entry = CacheEntry::new("k".to_string(), json!({"n": 1}), 60_000, 10, &options);

        assert_eq!(entry.value, json!({"n": 1}));
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.created_at, entry.last_accessed_at);
        assert_eq!(entry.tags.len(), 2);
        assert!(entry.is_protected());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = entry_with_ttl(50);
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(80));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), 0);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry_with_ttl(100);
        let created = entry.created_at;

        // Exactly ttl elapsed is still live; strictly more is expired
        assert!(!entry.is_expired_at(created + 100));
        assert!(entry.is_expired_at(created + 101));
    }

    #[test]
    fn test_touch_updates_access_metadata() {
        let mut entry = entry_with_ttl(1000);
        entry.touch(entry.created_at + 5, 7);
        entry.touch(entry.created_at + 9, 8);

        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed_at, entry.created_at + 9);
        assert_eq!(entry.access_seq, 8);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::Low.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::High.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        let p: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(p, Priority::Low);
    }
}
