//! Configuration Module
//!
//! Cache budget, expiry and persistence settings, loadable from environment
//! variables and adjustable at runtime through partial updates.

use std::env;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::{CacheError, Result};

// == Defaults ==
const DEFAULT_MAX_SIZE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60 * 1000;
const DEFAULT_PERSIST_INTERVAL_MS: u64 = 1000;

/// Cache configuration parameters.
///
/// Field names serialize in camelCase to match the snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Upper bound on the summed estimated size of all entries
    pub max_size_bytes: usize,
    /// TTL in milliseconds for entries set without an explicit TTL
    pub default_ttl: u64,
    /// Upper bound on the number of entries
    pub max_entries: usize,
    /// Ordering used when capacity must be freed
    pub eviction_policy: EvictionPolicy,
    /// Whether persistent entries are restored from and written to a snapshot
    pub persistent_storage_enabled: bool,
    /// Background expiry sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
    /// Debounce interval for snapshot write-back in milliseconds
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
}

fn default_persist_interval_ms() -> u64 {
    DEFAULT_PERSIST_INTERVAL_MS
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE_BYTES` - Size budget in bytes (default: 10 MiB)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `CACHE_EVICTION_POLICY` - `lru`, `lfu`, `ttl` or `priority` (default: lru)
    /// - `CACHE_PERSISTENT` - Enable snapshot persistence (default: false)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Expiry sweep frequency (default: 60000)
    /// - `CACHE_PERSIST_INTERVAL_MS` - Snapshot write-back debounce (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size_bytes: env_or("CACHE_MAX_SIZE_BYTES", defaults.max_size_bytes),
            default_ttl: env_or("CACHE_DEFAULT_TTL_MS", defaults.default_ttl),
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            eviction_policy: env_or("CACHE_EVICTION_POLICY", defaults.eviction_policy),
            persistent_storage_enabled: env_or(
                "CACHE_PERSISTENT",
                defaults.persistent_storage_enabled,
            ),
            cleanup_interval_ms: env_or("CACHE_CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            persist_interval_ms: env_or("CACHE_PERSIST_INTERVAL_MS", defaults.persist_interval_ms),
        }
    }

    // == Validate ==
    /// Checks the budget and interval invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "maxSizeBytes must be greater than zero".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "maxEntries must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl == 0 {
            return Err(CacheError::InvalidConfig(
                "defaultTtl must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanupIntervalMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    // == Apply Update ==
    /// Returns a validated copy of this config with the update's fields applied.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(v) = update.max_size_bytes {
            next.max_size_bytes = v;
        }
        if let Some(v) = update.default_ttl {
            next.default_ttl = v;
        }
        if let Some(v) = update.max_entries {
            next.max_entries = v;
        }
        if let Some(v) = update.eviction_policy {
            next.eviction_policy = v;
        }
        if let Some(v) = update.persistent_storage_enabled {
            next.persistent_storage_enabled = v;
        }
        if let Some(v) = update.cleanup_interval_ms {
            next.cleanup_interval_ms = v;
        }
        if let Some(v) = update.persist_interval_ms {
            next.persist_interval_ms = v;
        }
        next.validate()?;
        Ok(next)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            default_ttl: DEFAULT_TTL_MS,
            max_entries: DEFAULT_MAX_ENTRIES,
            eviction_policy: EvictionPolicy::default(),
            persistent_storage_enabled: false,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            persist_interval_ms: DEFAULT_PERSIST_INTERVAL_MS,
        }
    }
}

/// Partial configuration change; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub max_size_bytes: Option<usize>,
    pub default_ttl: Option<u64>,
    pub max_entries: Option<usize>,
    pub eviction_policy: Option<EvictionPolicy>,
    pub persistent_storage_enabled: Option<bool>,
    pub cleanup_interval_ms: Option<u64>,
    pub persist_interval_ms: Option<u64>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.default_ttl, 300_000);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
        assert!(!config.persistent_storage_enabled);
        assert_eq!(config.cleanup_interval_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("CACHE_MAX_SIZE_BYTES");
        env::remove_var("CACHE_DEFAULT_TTL_MS");
        env::remove_var("CACHE_MAX_ENTRIES");
        env::remove_var("CACHE_EVICTION_POLICY");
        env::remove_var("CACHE_PERSISTENT");
        env::remove_var("CACHE_CLEANUP_INTERVAL_MS");
        env::remove_var("CACHE_PERSIST_INTERVAL_MS");

        let config = CacheConfig::from_env();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let config = CacheConfig {
            max_size_bytes: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));

        let config = CacheConfig {
            max_entries: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_apply_partial_update() {
        let config = CacheConfig::default();
        let update = ConfigUpdate {
            max_entries: Some(10),
            eviction_policy: Some(EvictionPolicy::Priority),
            ..ConfigUpdate::default()
        };

        let next = config.apply(&update).unwrap();
        assert_eq!(next.max_entries, 10);
        assert_eq!(next.eviction_policy, EvictionPolicy::Priority);
        assert_eq!(next.max_size_bytes, config.max_size_bytes);
    }

    #[test]
    fn test_apply_invalid_update_is_rejected() {
        let config = CacheConfig::default();
        let update = ConfigUpdate {
            max_size_bytes: Some(0),
            ..ConfigUpdate::default()
        };
        assert!(config.apply(&update).is_err());
    }

    #[test]
    fn test_config_deserializes_camel_case_with_unknown_fields() {
        let json = r#"{
            "maxSizeBytes": 2048,
            "defaultTtl": 1000,
            "maxEntries": 5,
            "evictionPolicy": "lfu",
            "persistentStorageEnabled": true,
            "cleanupIntervalMs": 500,
            "compressionEnabled": true
        }"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_size_bytes, 2048);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.persist_interval_ms, DEFAULT_PERSIST_INTERVAL_MS);
    }
}
