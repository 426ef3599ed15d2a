//! Eviction Policy Module
//!
//! Orders cache entries into eviction candidates for each supported policy.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

// == Eviction Policy ==
/// Selects which entries are removed first when capacity must be freed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently read first
    #[default]
    Lru,
    /// Least frequently read first
    Lfu,
    /// Soonest to expire first
    Ttl,
    /// Lowest priority first
    Priority,
}

impl EvictionPolicy {
    // == Candidate Order ==
    /// Returns all keys in eviction order.
    ///
    /// Persistent high-priority entries are placed after every other
    /// candidate so they are only reached when nothing else can be freed.
    pub fn candidate_order(self, entries: &HashMap<String, CacheEntry>) -> Vec<String> {
        let mut candidates: Vec<&CacheEntry> = entries.values().collect();

        match self {
            EvictionPolicy::Lru => {
                candidates.sort_by_key(|e| (e.is_protected(), e.last_accessed_at, e.access_seq))
            }
            EvictionPolicy::Lfu => {
                candidates.sort_by_key(|e| (e.is_protected(), e.access_count, e.insertion_seq))
            }
            EvictionPolicy::Ttl => {
                candidates.sort_by_key(|e| (e.is_protected(), e.expires_at(), e.insertion_seq))
            }
            EvictionPolicy::Priority => candidates
                .sort_by_key(|e| (e.is_protected(), e.priority.rank(), e.insertion_seq)),
        }

        candidates.into_iter().map(|e| e.key.clone()).collect()
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Ttl => "ttl",
            EvictionPolicy::Priority => "priority",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "ttl" => Ok(EvictionPolicy::Ttl),
            "priority" => Ok(EvictionPolicy::Priority),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}
