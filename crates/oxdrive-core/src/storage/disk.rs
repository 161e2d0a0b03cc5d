//! Local directory storage backend.
//!
//! Blobs live under `<root>/<first two hex chars>/<full hex id>`, so no single
//! directory grows unbounded. Writes go through a temp file in the same
//! directory and are renamed into place.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace};

use super::{Storage, StorageError};
use crate::drive::path::Identity;

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (and create if needed) a store rooted at `root`.
    #[instrument(level = "debug", skip_all, fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io { source, id: None })?;
        debug!("Opened disk store");
        Ok(DiskStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &Identity) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }
}

impl Storage for DiskStore {
    fn get(&self, id: &Identity) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(id);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::not_found(id),
            _ => StorageError::io(e, id),
        })
    }

    fn put(&self, id: &Identity, data: &[u8]) -> Result<(), StorageError> {
        let path = self.blob_path(id);
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::Unavailable {
                reason: format!("blob path {} has no parent", path.display()),
            })?;
        fs::create_dir_all(parent).map_err(|e| StorageError::io(e, id))?;

        // Temp file in the same directory keeps the rename on one filesystem
        let mut temp_file =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| StorageError::io(e, id))?;
        temp_file.write_all(data).map_err(|e| StorageError::io(e, id))?;
        temp_file
            .persist(&path)
            .map_err(|e| StorageError::io(e.error, id))?;
        trace!(id = %id.short(), len = data.len(), "Stored blob on disk");
        Ok(())
    }

    fn delete(&self, id: &Identity) -> Result<(), StorageError> {
        let path = self.blob_path(id);
        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::not_found(id),
            _ => StorageError::io(e, id),
        })
    }

    fn contains(&self, id: &Identity) -> Result<bool, StorageError> {
        Ok(self.blob_path(id).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_disk_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::open(temp.path().join("store")).unwrap();
        let id = Identity::random();

        store.put(&id, b"chunk bytes").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"chunk bytes");

        let hex = id.to_hex();
        assert!(temp.path().join("store").join(&hex[..2]).join(&hex).is_file());

        store.delete(&id).unwrap();
        assert!(store.get(&id).unwrap_err().is_not_found());
        assert!(store.delete(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_disk_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let id = Identity::random();
        {
            let store = DiskStore::open(temp.path()).unwrap();
            store.put(&id, b"persisted").unwrap();
        }
        let reopened = DiskStore::open(temp.path()).unwrap();
        assert!(reopened.contains(&id).unwrap());
        assert_eq!(reopened.get(&id).unwrap(), b"persisted");
    }
}
