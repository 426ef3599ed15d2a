//! Snapshot Module
//!
//! JSON snapshot format holding the persistent subset of the cache, plus
//! export from and import into a `CacheStore`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, CacheEntry, CacheStats, CacheStore, Priority};
use crate::config::CacheConfig;
use crate::error::Result;

// == Snapshot ==
/// Durable representation of the persistent entries.
///
/// Unknown fields are ignored. `config` and `stats` are informational: a
/// malformed value there is dropped rather than failing the whole import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub config: Option<CacheConfig>,
    pub entries: BTreeMap<String, SnapshotEntry>,
    #[serde(default, deserialize_with = "lenient")]
    pub stats: Option<CacheStats>,
    /// Unix milliseconds when the snapshot was taken
    pub timestamp: u64,
}

/// One persisted entry; the key is the map key in `Snapshot::entries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub value: Value,
    pub created_at: u64,
    pub ttl: u64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed_at: u64,
    #[serde(default)]
    pub size_bytes: usize,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_persistent() -> bool {
    true
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).ok())
}

impl From<&CacheEntry> for SnapshotEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            value: entry.value.clone(),
            created_at: entry.created_at,
            ttl: entry.ttl,
            access_count: entry.access_count,
            last_accessed_at: entry.last_accessed_at,
            size_bytes: entry.size_bytes,
            tags: entry.tags.clone(),
            priority: entry.priority,
            persistent: entry.persistent,
        }
    }
}

impl SnapshotEntry {
    /// Rebuilds a cache entry under `key`. Sequence numbers are assigned by
    /// the store on insertion.
    ///
    /// Anything loaded from a snapshot is persistent, whatever the payload
    /// claims, so it is written back on the next flush.
    pub fn into_entry(self, key: String) -> CacheEntry {
        let last_accessed_at = self.last_accessed_at.max(self.created_at);
        CacheEntry {
            key,
            value: self.value,
            created_at: self.created_at,
            ttl: self.ttl,
            access_count: self.access_count,
            last_accessed_at,
            size_bytes: self.size_bytes,
            tags: self.tags,
            priority: self.priority,
            persistent: true,
            insertion_seq: 0,
            access_seq: 0,
        }
    }
}

impl Snapshot {
    // == Capture ==
    /// Captures the live persistent entries of `store`.
    pub fn capture(store: &CacheStore) -> Self {
        let entries = store
            .persistent_entries()
            .map(|entry| (entry.key.clone(), SnapshotEntry::from(entry)))
            .collect();
        Self {
            config: Some(store.config().clone()),
            entries,
            stats: Some(store.stats()),
            timestamp: current_timestamp_ms(),
        }
    }

    /// Parses a snapshot payload, rejecting anything structurally invalid.
    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    // == Apply ==
    /// Loads the entries into `store`, skipping expired ones and any entry
    /// the store rejects. Returns how many were restored.
    ///
    /// Entries are inserted oldest access first so that recency order
    /// survives the round trip.
    pub fn apply(self, store: &mut CacheStore) -> usize {
        let now = current_timestamp_ms();
        let mut entries: Vec<CacheEntry> = self
            .entries
            .into_iter()
            .map(|(key, entry)| entry.into_entry(key))
            .filter(|entry| !entry.is_expired_at(now))
            .collect();
        entries.sort_by_key(|entry| entry.last_accessed_at);

        let mut restored = 0;
        for entry in entries {
            let key = entry.key.clone();
            match store.restore_entry(entry) {
                Ok(true) => restored += 1,
                Ok(false) => debug!("Skipped expired snapshot entry '{}'", key),
                Err(err) => warn!("Skipped snapshot entry '{}': {}", key, err),
            }
        }
        restored
    }
}
