//! Durable blob storage abstraction.
//!
//! The persistent store only needs two primitives, read a named blob and
//! write it back, which each platform provides differently:
//! - Linux: one file per blob in a data directory
//! - ESP32: a file on the flash filesystem
//!
//! All methods are synchronous to support embedded platforms.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur while reading or writing a blob.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No blob with this name has been written yet.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The underlying medium failed.
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Storage is not available.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Named blob storage.
pub trait BlobStorage: Send + Sync {
    /// Read the whole blob.
    fn read_all(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace the whole blob.
    fn write_all(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// File-backed storage, one file per blob under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Use `root` as the data directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            name: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStorage for FileStorage {
    fn read_all(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        fs::read(self.path_of(name)).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io {
                name: name.to_string(),
                source,
            },
        })
    }

    /// Writes to a sibling temp file first and renames it over the target,
    /// so a crash mid-write leaves the previous blob intact.
    fn write_all(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.path_of(name);
        let staging = self.path_of(&format!("{name}.tmp"));
        let io_err = |source| StorageError::Io {
            name: name.to_string(),
            source,
        };
        fs::write(&staging, bytes).map_err(io_err)?;
        fs::rename(&staging, &target).map_err(io_err)
    }
}

/// In-memory storage. Clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-loaded with one blob.
    pub fn with_blob(name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let storage = Self::new();
        if let Ok(mut blobs) = storage.blobs.write() {
            blobs.insert(name.to_string(), bytes.into());
        }
        storage
    }

    /// Number of blobs held.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStorage for MemoryStorage {
    fn read_all(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))?;
        blobs
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn write_all(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .write()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))?
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("data")).unwrap();

        storage.write_all("ble.json", b"{\"a\":1}").unwrap();
        assert_eq!(storage.read_all("ble.json").unwrap(), b"{\"a\":1}");

        storage.write_all("ble.json", b"[]").unwrap();
        assert_eq!(storage.read_all("ble.json").unwrap(), b"[]");
        assert!(!dir.path().join("data").join("ble.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        assert!(matches!(
            storage.read_all("missing.json"),
            Err(StorageError::NotFound(name)) if name == "missing.json"
        ));
    }

    #[test]
    fn test_memory_storage_clones_share_blobs() {
        let storage = MemoryStorage::new();
        let handle = storage.clone();
        assert!(handle.is_empty());

        storage.write_all("ble.json", b"{}").unwrap();
        assert_eq!(handle.read_all("ble.json").unwrap(), b"{}");
        assert_eq!(handle.len(), 1);
        assert!(matches!(
            handle.read_all("other"),
            Err(StorageError::NotFound(_))
        ));
    }
}
