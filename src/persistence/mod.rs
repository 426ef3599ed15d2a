//! Persistence Module
//!
//! Writes the persistent subset of the cache to a durable medium and reads
//! it back at startup.

mod codec;
mod medium;
mod snapshot;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

pub use codec::{Codec, IdentityCodec};
pub use medium::{FileMedium, MemoryMedium, SnapshotMedium};
pub use snapshot::{Snapshot, SnapshotEntry};

use crate::error::{CacheError, Result};

// == Persistence Adapter ==
/// Moves snapshot payloads between the cache and a `SnapshotMedium`,
/// passing them through a `Codec` on the way.
#[derive(Clone)]
pub struct PersistenceAdapter {
    medium: Arc<dyn SnapshotMedium>,
    codec: Arc<dyn Codec>,
}

impl PersistenceAdapter {
    /// Creates an adapter over `medium` with the identity codec.
    pub fn new(medium: impl SnapshotMedium + 'static) -> Self {
        Self {
            medium: Arc::new(medium),
            codec: Arc::new(IdentityCodec),
        }
    }

    /// Shorthand for an adapter backed by a `FileMedium`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileMedium::new(path))
    }

    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    // == Load ==
    /// Reads and decodes the stored payload, if any.
    pub fn load(&self) -> Result<Option<String>> {
        let Some(raw) = self.medium.read()? else {
            return Ok(None);
        };
        let bytes = self.codec.decompress(&raw)?;
        let payload = String::from_utf8(bytes)
            .map_err(|err| CacheError::Persistence(format!("snapshot is not UTF-8: {}", err)))?;
        debug!("Loaded snapshot payload ({} bytes)", payload.len());
        Ok(Some(payload))
    }

    // == Save ==
    /// Encodes and writes `payload`, replacing the previous snapshot.
    pub fn save(&self, payload: &str) -> Result<()> {
        let bytes = self.codec.compress(payload.as_bytes());
        self.medium.write(&bytes)?;
        debug!("Wrote snapshot payload ({} bytes)", bytes.len());
        Ok(())
    }
}

impl fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceAdapter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reverses bytes; enough to prove the codec sits on the I/O path.
    struct ReverseCodec;

    impl Codec for ReverseCodec {
        fn compress(&self, bytes: &[u8]) -> Vec<u8> {
            bytes.iter().rev().copied().collect()
        }

        fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
            Ok(bytes.iter().rev().copied().collect())
        }
    }

    #[test]
    fn test_load_empty_medium() {
        let adapter = PersistenceAdapter::new(MemoryMedium::new());
        assert!(adapter.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let adapter = PersistenceAdapter::new(MemoryMedium::new());
        adapter.save(r#"{"entries":{}}"#).unwrap();
        assert_eq!(adapter.load().unwrap().as_deref(), Some(r#"{"entries":{}}"#));
    }

    #[test]
    fn test_codec_applied_on_both_paths() {
        let adapter = PersistenceAdapter::new(MemoryMedium::new()).with_codec(ReverseCodec);
        adapter.save("abc").unwrap();
        assert_eq!(adapter.load().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_non_utf8_payload_is_an_error() {
        let adapter = PersistenceAdapter::new(MemoryMedium::with_contents(vec![0xff, 0xfe]));
        assert!(matches!(adapter.load(), Err(CacheError::Persistence(_))));
    }

    #[test]
    fn test_file_adapter_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = PersistenceAdapter::file(dir.path().join("cache.json"));
        adapter.save("{}").unwrap();
        assert_eq!(adapter.load().unwrap().as_deref(), Some("{}"));
    }
}
