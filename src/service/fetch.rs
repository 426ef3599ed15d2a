//! Cached Fetch Module
//!
//! Memoizes asynchronous producers on top of the cache. Concurrent misses on
//! one key share a single producer call, and results of calls that were
//! invalidated while running are never written back.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::CacheService;
use crate::cache::SetOptions;
use crate::error::{CacheError, Result};

type Outcome = Result<Value>;

// == Fetch Registry ==
/// In-flight producer calls, each stamped with a generation.
///
/// Generations come from one counter shared by all keys. A completing call
/// may commit only while its own marker is still registered; invalidation
/// drops the marker, so nothing is kept for keys without a call in flight.
#[derive(Debug, Default)]
pub(crate) struct FetchRegistry {
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    sender: broadcast::Sender<Outcome>,
}

/// What a caller should do after consulting the cache and the registry.
enum Lookup {
    Cached(Value),
    Waiting(broadcast::Receiver<Outcome>),
}

impl FetchRegistry {
    fn join(&self, key: &str) -> Option<broadcast::Receiver<Outcome>> {
        self.in_flight.get(key).map(|call| call.sender.subscribe())
    }

    fn begin(&mut self, key: &str) -> (u64, broadcast::Sender<Outcome>, broadcast::Receiver<Outcome>) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let (sender, receiver) = broadcast::channel(1);
        self.in_flight.insert(
            key.to_string(),
            InFlight {
                generation,
                sender: sender.clone(),
            },
        );
        (generation, sender, receiver)
    }

    /// Clears the in-flight marker if it still belongs to `generation`.
    /// Returns whether it did, i.e. whether the result may be cached.
    fn finish(&mut self, key: &str, generation: u64) -> bool {
        let current = self
            .in_flight
            .get(key)
            .is_some_and(|call| call.generation == generation);
        if current {
            self.in_flight.remove(key);
        }
        current
    }

    fn invalidate(&mut self, key: &str) {
        self.in_flight.remove(key);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }
}

impl CacheService {
    // == Fetch ==
    /// Returns the cached value for `key`, or runs `source` to produce it.
    ///
    /// While a producer call for `key` is running, further callers wait on
    /// it instead of starting their own. Failures reach every waiter and are
    /// not cached.
    pub async fn fetch<T, F, Fut>(&self, key: &str, source: F, options: &SetOptions) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let lookup = self.begin_fetch(key, source, options, false);
        let value = self.await_fetch(key, lookup).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like `fetch`, but skips the cached value and always waits on a
    /// producer call (joining one already in flight).
    pub async fn refetch<T, F, Fut>(&self, key: &str, source: F, options: &SetOptions) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let lookup = self.begin_fetch(key, source, options, true);
        let value = self.await_fetch(key, lookup).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Drops the cached value for `key` and disowns any producer call in
    /// flight: it may finish, but its result is not stored. Returns whether a
    /// cached value was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        state.fetches.invalidate(key);
        state.store.remove(key)
    }

    /// Whether a producer call for `key` is currently registered.
    pub fn is_fetching(&self, key: &str) -> bool {
        self.lock().fetches.is_in_flight(key)
    }

    /// Binds `key`, `source` and `options` into a reusable handle.
    pub fn cached_fetch<T, F, Fut>(
        &self,
        key: impl Into<String>,
        source: F,
        options: SetOptions,
    ) -> CachedFetch<T, F>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        CachedFetch {
            service: self.clone(),
            key: key.into(),
            source,
            options,
            _value: PhantomData,
        }
    }

    fn begin_fetch<T, F, Fut>(&self, key: &str, source: F, options: &SetOptions, force: bool) -> Lookup
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (generation, sender, receiver) = {
            let mut state = self.lock();
            if !force {
                if let Some(value) = state.store.get(key) {
                    return Lookup::Cached(value);
                }
            }
            if let Some(receiver) = state.fetches.join(key) {
                debug!("Joining in-flight fetch for '{}'", key);
                return Lookup::Waiting(receiver);
            }
            state.fetches.begin(key)
        };

        // The producer is created and spawned outside the lock
        let producer = source();
        let service = self.clone();
        let key = key.to_string();
        let options = options.clone();
        debug!("Starting fetch for '{}' (generation {})", key, generation);

        tokio::spawn(async move {
            let outcome = match tokio::spawn(producer).await {
                Ok(Ok(value)) => serde_json::to_value(value).map_err(CacheError::from),
                Ok(Err(err)) => Err(CacheError::Fetch(Arc::new(err))),
                Err(join_err) => Err(CacheError::FetchAborted(format!(
                    "producer for '{}' did not complete: {}",
                    key, join_err
                ))),
            };
            service.complete_fetch(&key, generation, &outcome, &options);
            // Waiters may all have gone away
            let _ = sender.send(outcome);
        });

        Lookup::Waiting(receiver)
    }

    async fn await_fetch(&self, key: &str, lookup: Lookup) -> Result<Value> {
        match lookup {
            Lookup::Cached(value) => Ok(value),
            Lookup::Waiting(mut receiver) => receiver
                .recv()
                .await
                .map_err(|_| CacheError::FetchAborted(key.to_string()))?,
        }
    }

    /// Commits a producer result if its generation is still current.
    fn complete_fetch(&self, key: &str, generation: u64, outcome: &Outcome, options: &SetOptions) {
        let mut state = self.lock();
        let current = state.fetches.finish(key, generation);
        match outcome {
            Ok(value) if current => {
                if let Err(err) = state.store.set(key.to_string(), value.clone(), options) {
                    warn!("Fetched value for '{}' was not cached: {}", key, err);
                }
            }
            Ok(_) => debug!("Discarding result of invalidated fetch for '{}'", key),
            Err(err) => debug!("Fetch for '{}' failed: {}", key, err),
        }
    }
}

// == Cached Fetch Handle ==
/// A producer bound to one cache key.
///
/// ```ignore
/// let user = cache.cached_fetch("user-1", || load_user(1), SetOptions::new().ttl(30_000));
/// let first: User = user.fetch().await?;
/// user.invalidate();
/// ```
pub struct CachedFetch<T, F> {
    service: CacheService,
    key: String,
    source: F,
    options: SetOptions,
    _value: PhantomData<fn() -> T>,
}

impl<T, F, Fut> CachedFetch<T, F>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn fetch(&self) -> Result<T> {
        self.service
            .fetch(&self.key, || (self.source)(), &self.options)
            .await
    }

    pub async fn refetch(&self) -> Result<T> {
        self.service
            .refetch(&self.key, || (self.source)(), &self.options)
            .await
    }

    pub fn invalidate(&self) -> bool {
        self.service.invalidate(&self.key)
    }

    /// Whether a live value is cached, without touching statistics.
    pub fn is_cached(&self) -> bool {
        self.service.has(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn service() -> CacheService {
        CacheService::new(CacheConfig::default()).unwrap()
    }

    async fn explode() -> anyhow::Result<u32> {
        panic!("producer blew up")
    }

    #[test]
    fn test_registry_generations() {
        let mut registry = FetchRegistry::default();
        let (generation, _tx, _rx) = registry.begin("k");
        assert_eq!(generation, 0);
        assert!(registry.is_in_flight("k"));

        registry.invalidate("k");
        assert!(!registry.is_in_flight("k"));
        assert!(!registry.finish("k", generation));

        let (next, _tx, _rx) = registry.begin("k");
        assert!(next > generation);
        assert!(registry.finish("k", next));
        assert!(!registry.is_in_flight("k"));
    }

    #[test]
    fn test_stale_finish_keeps_newer_marker() {
        let mut registry = FetchRegistry::default();
        let (old, _tx1, _rx1) = registry.begin("k");
        registry.invalidate("k");
        let (_new, _tx2, _rx2) = registry.begin("k");

        assert!(!registry.finish("k", old));
        assert!(registry.is_in_flight("k"));
    }

    #[test]
    fn test_invalidate_without_fetch_keeps_registry_empty() {
        let cache = service();
        for i in 0..10_000 {
            cache.invalidate(&format!("never-fetched-{i}"));
        }
        assert_eq!(cache.lock().fetches.len(), 0);
    }

    #[tokio::test]
    async fn test_finished_fetches_leave_no_markers() {
        let cache = service();
        for i in 0..50u32 {
            let key = format!("item-{i}");
            let value: u32 = cache
                .fetch(&key, move || async move { Ok(i) }, &SetOptions::new())
                .await
                .unwrap();
            assert_eq!(value, i);
            cache.invalidate(&key);
        }
        assert_eq!(cache.lock().fetches.len(), 0);
    }

    #[tokio::test]
    async fn test_fetch_caches_result() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: u32 = cache
                .fetch(
                    "item",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7u32)
                    },
                    &SetOptions::new(),
                )
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_fetching("item"));
    }

    #[tokio::test]
    async fn test_fetch_error_not_cached() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let result: Result<u32> = cache
                .fetch(
                    "flaky",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(anyhow::anyhow!("upstream unavailable"))
                    },
                    &SetOptions::new(),
                )
                .await;
            assert!(matches!(result, Err(CacheError::Fetch(_))));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.has("flaky"));
        assert!(!cache.is_fetching("flaky"));
    }

    #[tokio::test]
    async fn test_producer_panic_reported_as_aborted() {
        let cache = service();
        let result: Result<u32> = cache
            .fetch("boom", explode, &SetOptions::new())
            .await;

        assert!(matches!(result, Err(CacheError::FetchAborted(_))));
        assert!(!cache.is_fetching("boom"));
    }

    #[tokio::test]
    async fn test_refetch_bypasses_cache() {
        let cache = service();
        cache
            .set("n", serde_json::json!(1), &SetOptions::new())
            .unwrap();

        let value: u32 = cache
            .refetch("n", || async { Ok(2u32) }, &SetOptions::new())
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(cache.get("n"), Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_cached_fetch_handle() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = cache.cached_fetch(
            "greeting",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(String::from("hello"))
                }
            },
            SetOptions::new().tags(["greetings"]),
        );

        assert_eq!(handle.fetch().await.unwrap(), "hello");
        assert_eq!(handle.fetch().await.unwrap(), "hello");
        assert!(handle.is_cached());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(handle.invalidate());
        assert!(!handle.is_cached());
        assert_eq!(handle.fetch().await.unwrap(), "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(cache.get_by_tag("greetings").len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_discards_result() {
        let cache = service();
        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .fetch(
                        "slow",
                        || async {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(1u32)
                        },
                        &SetOptions::new(),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_fetching("slow"));
        cache.invalidate("slow");

        // The waiter still receives the value, but nothing is cached
        assert_eq!(pending.await.unwrap().unwrap(), 1);
        assert!(!cache.has("slow"));
    }
}
