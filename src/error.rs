//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// Cloneable so that one producer failure can be handed to every caller
/// waiting on the same coalesced fetch.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Invalid request data (bad key, zero TTL)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A single value is larger than the whole cache budget
    #[error("Entry too large: '{key}' needs {size} bytes, cache holds at most {max}")]
    EntryTooLarge {
        key: String,
        size: usize,
        max: usize,
    },

    /// The producer behind a cached fetch failed
    #[error("Fetch failed: {0}")]
    Fetch(Arc<anyhow::Error>),

    /// The producer task ended without delivering a result
    #[error("Fetch aborted: {0}")]
    FetchAborted(String),

    /// A value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot medium could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Persistence(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
