//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::service::CacheService;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The interval is re-read from the cache config before every sleep, so
/// `update_config` changes to `cleanupIntervalMs` take effect on the next
/// cycle. The sweep itself locks the cache in small batches.
///
/// # Returns
/// A JoinHandle for the spawned task, which is aborted on shutdown.
///
/// # Example
/// ```ignore
/// let cache = CacheService::new(CacheConfig::default())?;
/// let cleanup_handle = spawn_cleanup_task(cache.clone());
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: CacheService) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            cache.config().cleanup_interval_ms
        );

        loop {
            let interval = Duration::from_millis(cache.config().cleanup_interval_ms);
            tokio::time::sleep(interval).await;
            cache.cleanup();
        }
    })
}
