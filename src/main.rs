//! Dashcache - Embedded cache host process
//!
//! Runs a cache instance with its background janitor and snapshot
//! write-back tasks until a shutdown signal arrives.

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashcache::{
    spawn_cleanup_task, spawn_persistence_task, CacheConfig, CacheService, PersistenceAdapter,
};

const DEFAULT_SNAPSHOT_PATH: &str = "dashcache.snapshot.json";

/// Main entry point for the cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache, restoring the snapshot if persistence is enabled
/// 4. Start the TTL cleanup and snapshot write-back tasks
/// 5. Wait for SIGINT/SIGTERM, then stop the tasks and flush once more
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dashcache");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_size_bytes={}, max_entries={}, default_ttl={}ms, policy={}, persistent={}",
        config.max_size_bytes,
        config.max_entries,
        config.default_ttl,
        config.eviction_policy,
        config.persistent_storage_enabled
    );

    let snapshot_path =
        std::env::var("CACHE_SNAPSHOT_PATH").unwrap_or_else(|_| DEFAULT_SNAPSHOT_PATH.to_string());
    let cache = CacheService::with_persistence(config, PersistenceAdapter::file(&snapshot_path))
        .context("failed to initialize cache")?;
    info!(
        "Cache initialized with {} entries (snapshot: {})",
        cache.stats().total_entries,
        snapshot_path
    );

    let cleanup_handle = spawn_cleanup_task(cache.clone());
    let persist_handle = spawn_persistence_task(cache.clone());
    info!("Background tasks started");

    shutdown_signal().await?;

    cleanup_handle.abort();
    persist_handle.abort();
    warn!("Background tasks aborted");

    let flusher = cache.clone();
    match tokio::task::spawn_blocking(move || flusher.persist()).await? {
        Ok(true) => info!("Final snapshot written to {}", snapshot_path),
        Ok(false) => {}
        Err(err) => warn!("Final snapshot failed: {}", err),
    }

    let stats = cache.stats();
    info!(
        "Shutdown complete: entries={}, hits={}, misses={}, evictions={}",
        stats.total_entries, stats.hit_count, stats.miss_count, stats.eviction_count
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
    Ok(())
}
