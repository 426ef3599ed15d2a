//! Snapshot Write-Back Task
//!
//! Background task that flushes persistent entries to the snapshot medium
//! whenever they changed since the last write.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::service::CacheService;

/// Spawns a background task that writes a snapshot every
/// `persistIntervalMs` if persistent entries changed in the meantime.
///
/// Writes run on the blocking pool so file I/O never stalls the runtime.
pub fn spawn_persistence_task(cache: CacheService) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting snapshot write-back task with interval of {} ms",
            cache.config().persist_interval_ms
        );

        loop {
            let interval = Duration::from_millis(cache.config().persist_interval_ms.max(1));
            tokio::time::sleep(interval).await;

            let flusher = cache.clone();
            match tokio::task::spawn_blocking(move || flusher.persist_if_dirty()).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!("Snapshot write-back failed: {}", err),
                Err(err) => warn!("Snapshot write-back task failed: {}", err),
            }
        }
    })
}
