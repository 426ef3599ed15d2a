//! Dashcache - An embeddable cache engine
//!
//! Size- and time-bounded key/value cache with pluggable eviction policies,
//! tag invalidation, durable snapshots and coalescing cached fetches.

pub mod cache;
pub mod config;
pub mod error;
pub mod persistence;
pub mod service;
pub mod tasks;

pub use cache::{CacheEvent, CacheStats, EvictionPolicy, Priority, SetOptions};
pub use config::{CacheConfig, ConfigUpdate};
pub use error::{CacheError, Result};
pub use persistence::PersistenceAdapter;
pub use service::{CacheService, CachedFetch, OptimizeReport};
pub use tasks::{spawn_cleanup_task, spawn_persistence_task};
