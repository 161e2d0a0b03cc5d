//! In-memory storage backend.

use dashmap::DashMap;
use tracing::trace;

use super::{Storage, StorageError};
use crate::drive::path::Identity;

/// Thread-safe in-memory blob store.
///
/// Backed by a `DashMap`, so concurrent readers and writers on different keys
/// never contend on a global lock. Useful for tests and for ephemeral drives.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<Identity, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Total bytes held across all blobs.
    pub fn total_bytes(&self) -> usize {
        self.blobs.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Storage for MemoryStore {
    fn get(&self, id: &Identity) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .get(id)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn put(&self, id: &Identity, data: &[u8]) -> Result<(), StorageError> {
        trace!(id = %id.short(), len = data.len(), "Storing blob in memory");
        self.blobs.insert(*id, data.to_vec());
        Ok(())
    }

    fn delete(&self, id: &Identity) -> Result<(), StorageError> {
        self.blobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn contains(&self, id: &Identity) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(id))
    }
}
