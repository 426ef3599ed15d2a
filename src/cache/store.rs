//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with size accounting, a tag
//! index, policy-driven eviction and TTL expiration.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::{
    current_timestamp_ms, CacheEntry, CacheEvent, CacheStats, SetOptions, SizeAccountant,
    StatsCollector, TagIndex, EVENT_CHANNEL_CAPACITY, MAX_KEY_LENGTH,
};
use crate::config::{CacheConfig, ConfigUpdate};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Main cache storage.
///
/// Every mutation keeps the entry map, tag index and size total in step:
/// an entry is never present in one without being reflected in the others.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Tag to keys index
    tags: TagIndex,
    /// Keys ordered by absolute expiry time
    expiry: BTreeSet<(u64, String)>,
    /// Running byte total
    size: SizeAccountant,
    /// Performance statistics
    stats: StatsCollector,
    config: CacheConfig,
    /// Monotonic counter for insertion and access ordering
    next_seq: u64,
    /// Set when persistent entries changed since the last snapshot
    dirty: bool,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore after validating the configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            entries: HashMap::new(),
            tags: TagIndex::new(),
            expiry: BTreeSet::new(),
            size: SizeAccountant::new(),
            stats: StatsCollector::new(),
            config,
            next_seq: 0,
            dirty: false,
            events,
        })
    }

    // == Set ==
    /// Stores a value under `key`, replacing any previous entry.
    ///
    /// Capacity pressure is resolved by evicting other entries. A value whose
    /// estimated size alone exceeds `max_size_bytes` is rejected with
    /// `EntryTooLarge` and the store is left unchanged.
    ///
    /// # Arguments
    /// * `key` - The key to store (non-empty, at most `MAX_KEY_LENGTH` bytes)
    /// * `value` - The value to store
    /// * `options` - TTL (defaults to `default_ttl`), tags, priority and persistence
    pub fn set(&mut self, key: String, value: Value, options: &SetOptions) -> Result<()> {
        validate_key(&key)?;
        let ttl = match options.ttl {
            Some(0) => {
                return Err(CacheError::InvalidRequest(
                    "TTL must be greater than zero".to_string(),
                ))
            }
            Some(ttl) => ttl,
            None => self.config.default_ttl,
        };

        let size_bytes = SizeAccountant::estimate(&key, &value);
        if size_bytes > self.config.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                key,
                size: size_bytes,
                max: self.config.max_size_bytes,
            });
        }

        // Old entry's tags and size leave the indexes before budgeting
        self.detach(&key);
        self.make_room(size_bytes, 1);

        let entry = CacheEntry::new(key.clone(), value, ttl, size_bytes, options);
        self.attach(entry);
        self.emit(CacheEvent::Set { key });
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns `None` if the key is absent or expired; expired entries are
    /// removed. Every call counts as exactly one hit or one miss.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = current_timestamp_ms();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.expire(key);
            self.stats.record_miss();
            return None;
        }

        let seq = self.bump_seq();
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, seq);
        if entry.persistent {
            self.dirty = true;
        }
        let value = entry.value.clone();
        self.stats.record_hit();
        Some(value)
    }

    // == Has ==
    /// True if `key` is present and live. Does not touch statistics; an
    /// expired entry is purged just as `get` would.
    pub fn has(&mut self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };
        if expired {
            self.expire(key);
            return false;
        }
        true
    }

    /// Looks at an entry without recording an access or purging it.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Remove ==
    /// Removes an entry and its tag associations. Returns whether it existed.
    ///
    /// # Arguments
    /// * `key` - The key to remove
    pub fn remove(&mut self, key: &str) -> bool {
        if self.detach(key).is_some() {
            self.emit(CacheEvent::Removed {
                key: key.to_string(),
            });
            true
        } else {
            false
        }
    }

    // == Clear ==
    /// Drops every entry. Cumulative statistics are kept.
    pub fn clear(&mut self) {
        if self.entries.values().any(|e| e.persistent) {
            self.dirty = true;
        }
        self.entries.clear();
        self.tags.clear();
        self.expiry.clear();
        self.size.reset();
        self.emit(CacheEvent::Cleared);
    }

    // == Batch Operations ==
    /// Repeated `get`; only found keys appear in the result.
    pub fn get_multiple<I, K>(&mut self, keys: I) -> HashMap<String, Value>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.get(key).map(|value| (key.to_string(), value))
            })
            .collect()
    }

    /// Repeated `set`; returns the failures keyed by the rejected key.
    pub fn set_multiple<I>(&mut self, items: I) -> HashMap<String, CacheError>
    where
        I: IntoIterator<Item = (String, Value, SetOptions)>,
    {
        let mut failures = HashMap::new();
        for (key, value, options) in items {
            if let Err(err) = self.set(key.clone(), value, &options) {
                failures.insert(key, err);
            }
        }
        failures
    }

    /// Repeated `remove`; returns how many keys existed.
    pub fn remove_multiple<I, K>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| self.remove(key.as_ref()))
            .count()
    }

    // == Tag Operations ==
    /// Resolves every key under `tag` through `get`.
    pub fn get_by_tag(&mut self, tag: &str) -> HashMap<String, Value> {
        let keys = self.tags.keys(tag);
        self.get_multiple(keys)
    }

    /// Removes every live entry tagged `tag` and returns how many were
    /// removed. Expired entries under the tag are purged but not counted.
    pub fn remove_by_tag(&mut self, tag: &str) -> usize {
        let now = current_timestamp_ms();
        let mut removed = 0;
        for key in self.tags.keys(tag) {
            let expired = match self.entries.get(&key) {
                Some(entry) => entry.is_expired_at(now),
                None => continue,
            };
            if expired {
                self.expire(&key);
            } else if self.remove(&key) {
                removed += 1;
            }
        }
        debug!("Removed {} entries tagged '{}'", removed, tag);
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache in one pass.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let removed = self.purge_expired(usize::MAX);
        self.stats.record_cleanup(current_timestamp_ms());
        removed
    }

    /// Up to `limit` keys whose TTL has elapsed, soonest-expired first.
    ///
    /// Walks the expiry index, so the cost is proportional to the keys
    /// returned rather than to the size of the store.
    pub fn expired_keys(&self, limit: usize) -> Vec<String> {
        let now = current_timestamp_ms();
        self.expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at < now)
            .take(limit)
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Removes up to `limit` expired entries. Returns how many were removed.
    pub fn purge_expired(&mut self, limit: usize) -> usize {
        let mut removed = 0;
        for key in self.expired_keys(limit) {
            if self.expire(&key) {
                removed += 1;
            }
        }
        removed
    }

    /// Stamps `lastCleanupAt` with the current time.
    pub fn record_cleanup(&mut self) {
        self.stats.record_cleanup(current_timestamp_ms());
    }

    // == Evict ==
    /// Evicts entries in policy order until at least `target_bytes` are freed
    /// (10% of `max_size_bytes`, at least one byte, when `None`) or no
    /// candidates remain.
    ///
    /// # Arguments
    /// * `target_bytes` - Bytes to free, or `None` for the default target
    ///
    /// Returns the number of entries evicted.
    pub fn evict(&mut self, target_bytes: Option<usize>) -> usize {
        let target = target_bytes.unwrap_or(self.config.max_size_bytes.div_ceil(10).max(1));
        let mut freed = 0;
        let mut evicted = 0;
        for key in self.config.eviction_policy.candidate_order(&self.entries) {
            if freed >= target {
                break;
            }
            if let Some(size) = self.evict_key(&key) {
                freed += size;
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("Evicted {} entries freeing {} bytes", evicted, freed);
        }
        evicted
    }

    // == Config ==
    /// Returns the active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Applies a partial configuration change and evicts until the store fits
    /// the new budget. Returns the number of entries evicted.
    pub fn update_config(&mut self, update: &ConfigUpdate) -> Result<usize> {
        self.config = self.config.apply(update)?;
        Ok(self.make_room(0, 0))
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
            .snapshot(self.entries.len(), self.size.used(), self.config.max_size_bytes)
    }

    /// Memory utilization as a percentage of `max_size_bytes`.
    pub fn utilization_pct(&self) -> f64 {
        self.size.used() as f64 / self.config.max_size_bytes as f64 * 100.0
    }

    // == Persistence Support ==
    /// Live entries flagged persistent.
    pub fn persistent_entries(&self) -> impl Iterator<Item = &CacheEntry> {
        let now = current_timestamp_ms();
        self.entries
            .values()
            .filter(move |entry| entry.persistent && !entry.is_expired_at(now))
    }

    /// Inserts an entry carried over from a snapshot, keeping its timestamps
    /// and counters. Expired entries are skipped and `Ok(false)` is returned.
    pub fn restore_entry(&mut self, mut entry: CacheEntry) -> Result<bool> {
        validate_key(&entry.key)?;
        if entry.ttl == 0 || entry.is_expired() {
            return Ok(false);
        }

        entry.size_bytes = SizeAccountant::estimate(&entry.key, &entry.value);
        if entry.size_bytes > self.config.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                key: entry.key,
                size: entry.size_bytes,
                max: self.config.max_size_bytes,
            });
        }

        self.detach(&entry.key);
        self.make_room(entry.size_bytes, 1);

        let key = entry.key.clone();
        self.attach(entry);
        self.emit(CacheEvent::Set { key });
        Ok(true)
    }

    /// Returns and resets the dirty flag for persistent entries.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Flags persistent state for rewrite, e.g. after a failed snapshot write.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Receiver for every subsequent mutation event.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed estimated size of all entries.
    pub fn size_bytes(&self) -> usize {
        self.size.used()
    }

    /// Keys currently registered under `tag`, including not-yet-purged
    /// expired ones.
    pub fn tagged_keys(&self, tag: &str) -> Vec<String> {
        self.tags.keys(tag)
    }

    // == Internals ==
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Inserts into the map and both indexes, stamping fresh sequence numbers.
    fn attach(&mut self, mut entry: CacheEntry) {
        let seq = self.bump_seq();
        entry.insertion_seq = seq;
        entry.access_seq = seq;
        self.tags.insert(&entry.key, &entry.tags);
        self.expiry.insert((entry.expires_at(), entry.key.clone()));
        self.size.add(entry.size_bytes);
        if entry.persistent {
            self.dirty = true;
        }
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Removes from the map and both indexes.
    fn detach(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.tags.remove(key, &entry.tags);
        self.expiry.remove(&(entry.expires_at(), entry.key.clone()));
        self.size.sub(entry.size_bytes);
        if entry.persistent {
            self.dirty = true;
        }
        Some(entry)
    }

    fn expire(&mut self, key: &str) -> bool {
        if self.detach(key).is_some() {
            self.emit(CacheEvent::Expired {
                key: key.to_string(),
            });
            true
        } else {
            false
        }
    }

    fn evict_key(&mut self, key: &str) -> Option<usize> {
        let entry = self.detach(key)?;
        self.stats.record_eviction();
        debug!("Evicted '{}' ({} bytes)", key, entry.size_bytes);
        self.emit(CacheEvent::Evicted {
            key: key.to_string(),
        });
        Some(entry.size_bytes)
    }

    fn over_budget(&self, incoming_bytes: usize, incoming_entries: usize) -> bool {
        self.size.used() + incoming_bytes > self.config.max_size_bytes
            || self.entries.len() + incoming_entries > self.config.max_entries
    }

    /// Frees space for an incoming entry: expired entries go first, then live
    /// ones in policy order. Returns the number of live entries evicted.
    fn make_room(&mut self, incoming_bytes: usize, incoming_entries: usize) -> usize {
        if !self.over_budget(incoming_bytes, incoming_entries) {
            return 0;
        }

        self.purge_expired(usize::MAX);

        let mut evicted = 0;
        for key in self.config.eviction_policy.candidate_order(&self.entries) {
            if !self.over_budget(incoming_bytes, incoming_entries) {
                break;
            }
            if self.evict_key(&key).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
