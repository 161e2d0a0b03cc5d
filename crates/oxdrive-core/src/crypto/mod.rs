//! Convergent self-encryption of file content.
//!
//! File bytes are split into fixed-size chunks. Each chunk is encrypted with
//! AES-256-GCM under a key derived from its own plaintext (SHA-256), and stored
//! under the SHA-512 of its ciphertext. The resulting [`DataMap`] is all a
//! directory entry needs to reconstruct the file. Identical content produces
//! identical chunks, so copying a data map between entries never re-uploads.
//!
//! Small files skip chunking and keep their bytes inline in the data map.

pub mod chunk_refs;
pub mod data_map;
pub mod self_encryptor;

use thiserror::Error;

use crate::storage::StorageError;

pub use data_map::{ChunkDetails, DataMap};
pub use self_encryptor::SelfEncryptor;

/// Plaintext size of a full chunk (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Content up to this many bytes is stored inline in the data map.
pub const INLINE_THRESHOLD: usize = 3 * 1024;

/// Errors from the self-encryption layer.
#[derive(Error, Debug)]
pub enum EncryptionError {
    /// AES-GCM refused to encrypt a chunk.
    #[error("Failed to encrypt chunk {index}: {reason}")]
    ChunkEncryption { index: usize, reason: String },

    /// Authentication failed while decrypting a chunk.
    ///
    /// **[INTEGRITY VIOLATION]** The stored ciphertext or the data map entry
    /// has been corrupted or tampered with.
    #[error("[INTEGRITY VIOLATION] Failed to decrypt chunk {index}: {reason}")]
    ChunkDecryption { index: usize, reason: String },

    /// A chunk's ciphertext does not hash to the address it was stored under.
    #[error("[INTEGRITY VIOLATION] Chunk {index} does not match its content address")]
    ChunkIntegrity { index: usize },

    #[error("Invalid data map: {0}")]
    DataMapParse(#[from] serde_json::Error),

    /// Offset arithmetic would exceed the addressable range.
    #[error("Offset {offset} with length {length} exceeds the supported file size")]
    OffsetOverflow { offset: u64, length: usize },

    /// A chunk's reference counter is not an 8-byte count.
    #[error("Reference counter for chunk {chunk} is corrupt")]
    CorruptRefCount { chunk: String },

    #[error("Chunk storage error: {0}")]
    Storage(#[from] StorageError),
}
