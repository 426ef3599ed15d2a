//! Durable media that hold the serialized snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

// == Snapshot Medium ==
/// A single-slot durable key/value medium for snapshot bytes.
pub trait SnapshotMedium: Send + Sync {
    /// Returns the stored bytes, or `None` if nothing was written yet.
    fn read(&self) -> io::Result<Option<Vec<u8>>>;
    /// Replaces the stored bytes.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;
}

impl<M: SnapshotMedium + ?Sized> SnapshotMedium for Arc<M> {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        (**self).read()
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }
}

// == File Medium ==
/// Stores the snapshot in a single file, replaced atomically via rename.
#[derive(Debug, Clone)]
pub struct FileMedium {
    path: PathBuf,
}

impl FileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotMedium for FileMedium {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }
}

// == Memory Medium ==
/// Keeps the snapshot in memory; useful for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: Mutex::new(Some(bytes.into())),
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.slot.lock().clone()
    }
}

impl SnapshotMedium for MemoryMedium {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.slot.lock().clone())
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        *self.slot.lock() = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_medium_missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("absent.json"));
        assert!(medium.read().unwrap().is_none());
    }

    #[test]
    fn test_file_medium_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("nested").join("snap.json"));

        medium.write(b"first").unwrap();
        medium.write(b"second").unwrap();

        assert_eq!(medium.read().unwrap(), Some(b"second".to_vec()));
        assert!(!medium.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_memory_medium() {
        let medium = MemoryMedium::new();
        assert!(medium.read().unwrap().is_none());

        medium.write(b"abc").unwrap();
        assert_eq!(medium.contents(), Some(b"abc".to_vec()));

        let seeded = MemoryMedium::with_contents("xyz");
        assert_eq!(seeded.read().unwrap(), Some(b"xyz".to_vec()));
    }
}
