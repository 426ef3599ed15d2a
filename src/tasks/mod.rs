//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at the configured interval
//! - Snapshot Write-Back: Flushes changed persistent entries to the medium

mod cleanup;
mod persist;

pub use cleanup::spawn_cleanup_task;
pub use persist::spawn_persistence_task;
