//! Change notifications emitted by the store.

use serde::Serialize;

/// Buffered events per subscriber before slow receivers start lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// == Cache Event ==
/// A mutation observed on the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheEvent {
    /// A value was inserted or replaced
    Set { key: String },
    /// Explicit removal (direct or by tag)
    Removed { key: String },
    /// Purged after its TTL elapsed
    Expired { key: String },
    /// Removed to satisfy the size or entry budget
    Evicted { key: String },
    /// Every entry was dropped
    Cleared,
}

impl CacheEvent {
    /// The key this event concerns; `None` for `Cleared`.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Set { key }
            | CacheEvent::Removed { key }
            | CacheEvent::Expired { key }
            | CacheEvent::Evicted { key } => Some(key),
            CacheEvent::Cleared => None,
        }
    }

    /// Whether a watcher of `key` should be told about this event.
    pub fn concerns(&self, key: &str) -> bool {
        self.key().map_or(true, |k| k == key)
    }
}
