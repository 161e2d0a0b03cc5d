//! Identity-keyed blob storage.
//!
//! The drive keeps two kinds of blobs in a [`Storage`] backend: serialized
//! directory listings (keyed by directory id) and encrypted content chunks
//! (keyed by the hash of their ciphertext). Backends are plain key-value
//! stores; the directory engine is generic over any implementation.

pub mod disk;
pub mod memory;

use crate::drive::path::Identity;
use std::io;
use thiserror::Error;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Errors surfaced by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No blob stored under {id}")]
    NotFound { id: Box<Identity> },

    #[error("Storage I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
        id: Option<Box<Identity>>,
    },

    #[error("Storage backend unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StorageError {
    pub fn not_found(id: &Identity) -> Self {
        StorageError::NotFound { id: Box::new(*id) }
    }

    pub fn io(source: io::Error, id: &Identity) -> Self {
        StorageError::Io {
            source,
            id: Some(Box::new(*id)),
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Key-value capability over identity-addressed blobs.
///
/// Implementations must be safe to share between threads. Every call is
/// synchronous and may block for as long as the backend needs.
pub trait Storage: Send + Sync {
    /// Fetch the blob stored under `id`.
    fn get(&self, id: &Identity) -> Result<Vec<u8>, StorageError>;

    /// Store `data` under `id`, replacing any previous blob.
    fn put(&self, id: &Identity, data: &[u8]) -> Result<(), StorageError>;

    /// Remove the blob stored under `id`.
    ///
    /// Returns [`StorageError::NotFound`] if nothing is stored there.
    fn delete(&self, id: &Identity) -> Result<(), StorageError>;

    /// Check whether a blob exists under `id`.
    fn contains(&self, id: &Identity) -> Result<bool, StorageError> {
        match self.get(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
