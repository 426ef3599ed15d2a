//! Cache Service Module
//!
//! The shareable cache handle handed to application code. One mutex guards
//! the store and the fetch registry, so index and size bookkeeping is never
//! observed half-applied.

mod fetch;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use fetch::CachedFetch;
use fetch::FetchRegistry;

use crate::cache::{CacheEvent, CacheStats, CacheStore, SetOptions};
use crate::config::{CacheConfig, ConfigUpdate};
use crate::error::{CacheError, Result};
use crate::persistence::{PersistenceAdapter, Snapshot};

// == Constants ==
/// Expired keys purged per critical section during a sweep
pub const CLEANUP_BATCH_SIZE: usize = 256;

/// `optimize` runs an extra eviction pass above this utilization
pub const OPTIMIZE_UTILIZATION_THRESHOLD_PCT: f64 = 80.0;

/// Everything behind the single serialization point.
pub(crate) struct CacheState {
    pub(crate) store: CacheStore,
    pub(crate) fetches: FetchRegistry,
}

struct Inner {
    state: Mutex<CacheState>,
    persistence: Option<PersistenceAdapter>,
    /// Orders snapshot writes so an older capture never lands last
    persist_lock: Mutex<()>,
}

/// Outcome of an `optimize` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    /// Entries removed because their TTL elapsed
    pub expired: usize,
    /// Live entries evicted to bring utilization down
    pub evicted: usize,
}

// == Cache Service ==
/// Cloneable handle to one cache instance.
///
/// Construct it once and pass clones to whoever needs the cache; there is
/// no process-wide instance.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl CacheService {
    // == Constructors ==
    /// Creates an in-memory cache without durable snapshots.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Creates a cache backed by `adapter`. When persistence is enabled in
    /// `config`, the stored snapshot is restored; a missing or unreadable
    /// snapshot leaves the cache empty.
    pub fn with_persistence(config: CacheConfig, adapter: PersistenceAdapter) -> Result<Self> {
        let restore = config.persistent_storage_enabled;
        let service = Self::build(config, Some(adapter))?;
        if restore {
            service.restore();
        }
        Ok(service)
    }

    fn build(config: CacheConfig, persistence: Option<PersistenceAdapter>) -> Result<Self> {
        let store = CacheStore::new(config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    store,
                    fetches: FetchRegistry::default(),
                }),
                persistence,
                persist_lock: Mutex::new(()),
            }),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock()
    }

    // == Core Operations ==
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().store.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value, options: &SetOptions) -> Result<()> {
        self.lock().store.set(key.into(), value, options)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().store.remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().store.has(key)
    }

    pub fn clear(&self) {
        self.lock().store.clear();
        debug!("Cache cleared");
    }

    // == Batch Operations ==
    pub fn get_multiple<I, K>(&self, keys: I) -> HashMap<String, Value>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.lock().store.get_multiple(keys)
    }

    pub fn set_multiple<I>(&self, items: I) -> HashMap<String, CacheError>
    where
        I: IntoIterator<Item = (String, Value, SetOptions)>,
    {
        self.lock().store.set_multiple(items)
    }

    pub fn remove_multiple<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.lock().store.remove_multiple(keys)
    }

    // == Tag Operations ==
    pub fn get_by_tag(&self, tag: &str) -> HashMap<String, Value> {
        self.lock().store.get_by_tag(tag)
    }

    pub fn remove_by_tag(&self, tag: &str) -> usize {
        self.lock().store.remove_by_tag(tag)
    }

    /// Alias of `remove_by_tag`.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        self.remove_by_tag(tag)
    }

    // == Maintenance ==
    /// Removes every expired entry and stamps `lastCleanupAt`.
    ///
    /// The sweep releases the lock between batches of `CLEANUP_BATCH_SIZE`
    /// keys so foreground calls are not starved.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        loop {
            let purged = self.lock().store.purge_expired(CLEANUP_BATCH_SIZE);
            removed += purged;
            if purged < CLEANUP_BATCH_SIZE {
                break;
            }
        }
        self.lock().store.record_cleanup();

        if removed > 0 {
            info!("TTL cleanup: removed {} expired entries", removed);
        } else {
            debug!("TTL cleanup: no expired entries found");
        }
        removed
    }

    /// Sweeps expired entries, then evicts 10% of the budget if utilization
    /// is still above 80%.
    pub fn optimize(&self) -> OptimizeReport {
        let expired = self.cleanup();
        let mut state = self.lock();
        let evicted = if state.store.utilization_pct() > OPTIMIZE_UTILIZATION_THRESHOLD_PCT {
            state.store.evict(None)
        } else {
            0
        };
        debug!("Optimize: {} expired, {} evicted", expired, evicted);
        OptimizeReport { expired, evicted }
    }

    // == Stats & Config ==
    pub fn stats(&self) -> CacheStats {
        self.lock().store.stats()
    }

    pub fn config(&self) -> CacheConfig {
        self.lock().store.config().clone()
    }

    /// Applies a partial config change. Shrinking budgets evicts before
    /// returning, so the store is never left above the new limits.
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<usize> {
        let evicted = self.lock().store.update_config(update)?;
        if evicted > 0 {
            info!("Config update evicted {} entries", evicted);
        }
        Ok(evicted)
    }

    // == Snapshots ==
    /// Serializes the live persistent entries to the snapshot JSON format.
    pub fn export(&self) -> Result<String> {
        let snapshot = Snapshot::capture(&self.lock().store);
        snapshot.to_json()
    }

    /// Loads a snapshot payload. Returns `false` (leaving the cache as it
    /// was) when the payload is not a structurally valid snapshot.
    pub fn import(&self, payload: &str) -> bool {
        let snapshot = match Snapshot::parse(payload) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Rejected cache snapshot: {}", err);
                return false;
            }
        };
        let restored = snapshot.apply(&mut self.lock().store);
        info!("Imported {} entries from snapshot", restored);
        true
    }

    fn restore(&self) {
        let Some(adapter) = &self.inner.persistence else {
            return;
        };
        match adapter.load() {
            Ok(Some(payload)) => {
                if !self.import(&payload) {
                    warn!("Stored snapshot is unusable, starting with an empty cache");
                }
            }
            Ok(None) => info!("No cache snapshot found, starting empty"),
            Err(err) => warn!("Could not read cache snapshot, starting empty: {}", err),
        }
    }

    /// Writes the current persistent entries to the medium. Returns whether
    /// a snapshot was written (persistence may be absent or disabled).
    pub fn persist(&self) -> Result<bool> {
        self.write_snapshot(true)
    }

    /// Like `persist`, but only when persistent entries changed since the
    /// last write.
    pub fn persist_if_dirty(&self) -> Result<bool> {
        self.write_snapshot(false)
    }

    fn write_snapshot(&self, force: bool) -> Result<bool> {
        let Some(adapter) = &self.inner.persistence else {
            return Ok(false);
        };
        let _ordered = self.inner.persist_lock.lock();

        let payload = {
            let mut state = self.lock();
            if !state.store.config().persistent_storage_enabled {
                return Ok(false);
            }
            let dirty = state.store.take_dirty();
            if !dirty && !force {
                return Ok(false);
            }
            Snapshot::capture(&state.store).to_json()?
        };

        if let Err(err) = adapter.save(&payload) {
            self.lock().store.mark_dirty();
            return Err(err);
        }
        debug!("Cache snapshot written");
        Ok(true)
    }

    // == Change Notifications ==
    /// Receiver for every subsequent mutation event.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.lock().store.subscribe()
    }

    /// Invokes `callback` for each event about `key` (and for `Cleared`)
    /// until the returned task is aborted or the cache is dropped.
    pub fn on_change<F>(&self, key: impl Into<String>, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(CacheEvent) + Send + 'static,
    {
        let key = key.into();
        let mut events = self.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.concerns(&key) => callback(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Change listener for '{}' skipped {} events", key, skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
