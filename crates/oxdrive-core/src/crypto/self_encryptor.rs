//! Random-access reader/writer over a [`DataMap`].

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use ring::digest;
use tracing::{debug, instrument, trace};
use zeroize::Zeroizing;

use super::{
    CHUNK_SIZE, ChunkDetails, DataMap, EncryptionError, INLINE_THRESHOLD, chunk_refs,
};
use crate::drive::path::Identity;
use crate::storage::Storage;

/// Live content handle for one open file.
///
/// Reads before the first mutation decrypt only the chunks that overlap the
/// requested range. The first write or truncate pulls the whole plaintext into
/// a buffer; [`flush`](Self::flush) re-chunks it and produces the new data map.
pub struct SelfEncryptor<S: Storage + ?Sized> {
    data_map: DataMap,
    storage: Arc<S>,
    buffer: Option<Vec<u8>>,
    dirty: bool,
}

impl<S: Storage + ?Sized> std::fmt::Debug for SelfEncryptor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfEncryptor")
            .field("chunks", &self.data_map.chunks.len())
            .field("size", &self.size())
            .field("loaded", &self.buffer.is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<S: Storage + ?Sized> SelfEncryptor<S> {
    pub fn new(data_map: DataMap, storage: Arc<S>) -> Self {
        SelfEncryptor {
            data_map,
            storage,
            buffer: None,
            dirty: false,
        }
    }

    /// The data map as of the last flush.
    pub fn data_map(&self) -> &DataMap {
        &self.data_map
    }

    /// Current plaintext size, including unflushed writes.
    pub fn size(&self) -> u64 {
        match &self.buffer {
            Some(buffer) => buffer.len() as u64,
            None => self.data_map.size(),
        }
    }

    /// True if there are writes not yet reflected in [`data_map`](Self::data_map).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// Returns fewer bytes at end of file and an empty vector past it.
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>, EncryptionError> {
        let size = self.size();
        if offset >= size || length == 0 {
            return Ok(Vec::new());
        }
        let end = offset
            .checked_add(length as u64)
            .ok_or(EncryptionError::OffsetOverflow { offset, length })?
            .min(size);

        let range = to_usize(offset, length)?..to_usize(end, length)?;
        if let Some(buffer) = &self.buffer {
            return Ok(buffer[range].to_vec());
        }
        if self.data_map.chunks.is_empty() {
            return Ok(self.data_map.content[range].to_vec());
        }

        let mut out = Vec::with_capacity(to_usize(end - offset, length)?);
        let mut chunk_start = 0u64;
        for (index, chunk) in self.data_map.chunks.iter().enumerate() {
            let chunk_end = chunk_start + u64::from(chunk.size);
            if chunk_end > offset && chunk_start < end {
                let plain = self.fetch_chunk(index, chunk)?;
                let from = to_usize(offset.saturating_sub(chunk_start), length)?;
                let to = to_usize(end.min(chunk_end) - chunk_start, length)?;
                out.extend_from_slice(&plain[from..to]);
            }
            if chunk_end >= end {
                break;
            }
            chunk_start = chunk_end;
        }
        Ok(out)
    }

    /// Write `data` at `offset`, zero-filling any gap past the current end.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), EncryptionError> {
        let length = data.len();
        let start = to_usize(offset, length)?;
        let end = start
            .checked_add(length)
            .ok_or(EncryptionError::OffsetOverflow { offset, length })?;

        let buffer = self.load()?;
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(data);
        self.dirty = true;
        trace!(offset, length, "Buffered write");
        Ok(())
    }

    /// Shrink or extend the content to exactly `size` bytes.
    pub fn truncate(&mut self, size: u64) -> Result<(), EncryptionError> {
        let new_len = to_usize(size, 0)?;
        let buffer = self.load()?;
        if buffer.len() != new_len {
            buffer.resize(new_len, 0);
            self.dirty = true;
        }
        Ok(())
    }

    /// Encrypt buffered content into chunks and return the new data map.
    ///
    /// Chunks already present in storage are not written again. Chunks that
    /// the previous map referenced are left in place; releasing them is up to
    /// whoever commits the new map (see [`chunk_refs`](super::chunk_refs)).
    #[instrument(level = "debug", skip(self), fields(size = self.size()))]
    pub fn flush(&mut self) -> Result<DataMap, EncryptionError> {
        if !self.dirty {
            return Ok(self.data_map.clone());
        }
        let Some(buffer) = self.buffer.as_ref() else {
            return Ok(self.data_map.clone());
        };

        let data_map = if buffer.len() <= INLINE_THRESHOLD {
            DataMap {
                chunks: Vec::new(),
                content: buffer.clone(),
            }
        } else {
            let mut chunks = Vec::with_capacity(buffer.len().div_ceil(CHUNK_SIZE));
            for (index, piece) in buffer.chunks(CHUNK_SIZE).enumerate() {
                let (details, ciphertext) = encrypt_chunk(index, piece)?;
                if !self.storage.contains(&details.hash)? {
                    self.storage.put(&details.hash, &ciphertext)?;
                }
                chunks.push(details);
            }
            DataMap {
                chunks,
                content: Vec::new(),
            }
        };

        debug!(chunks = data_map.chunks.len(), "Flushed content");
        self.data_map = data_map;
        self.dirty = false;
        Ok(self.data_map.clone())
    }

    /// Drop this map's reference to each of its chunks, deleting the ones no
    /// other data map still references. Returns how many chunks were deleted.
    ///
    /// Chunks that are already gone are skipped.
    pub fn delete_all_chunks(&self) -> Result<usize, EncryptionError> {
        let deleted = chunk_refs::release(&*self.storage, &self.data_map)?;
        trace!(deleted, "Released content chunks");
        Ok(deleted)
    }

    /// Go back to `previous` after a flushed map could not be committed.
    ///
    /// Buffered content is kept and marked dirty so the next flush retries.
    pub fn rollback(&mut self, previous: DataMap) {
        self.data_map = previous;
        if self.buffer.is_some() {
            self.dirty = true;
        }
    }

    fn load(&mut self) -> Result<&mut Vec<u8>, EncryptionError> {
        if self.buffer.is_none() {
            let mut plain = Vec::with_capacity(to_usize(self.data_map.size(), 0)?);
            if self.data_map.chunks.is_empty() {
                plain.extend_from_slice(&self.data_map.content);
            } else {
                for (index, chunk) in self.data_map.chunks.iter().enumerate() {
                    plain.extend_from_slice(&self.fetch_chunk(index, chunk)?);
                }
            }
            self.buffer = Some(plain);
        }
        Ok(self.buffer.get_or_insert_with(Vec::new))
    }

    fn fetch_chunk(&self, index: usize, chunk: &ChunkDetails) -> Result<Vec<u8>, EncryptionError> {
        let ciphertext = self.storage.get(&chunk.hash)?;
        decrypt_chunk(index, chunk, &ciphertext)
    }
}

fn to_usize(value: u64, length: usize) -> Result<usize, EncryptionError> {
    usize::try_from(value).map_err(|_| EncryptionError::OffsetOverflow {
        offset: value,
        length,
    })
}

fn chunk_nonce(pre_hash: &[u8; 32]) -> [u8; 12] {
    let seed = digest::digest(&digest::SHA256, pre_hash);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&seed.as_ref()[..12]);
    nonce
}

/// Encrypt one chunk convergently and return its details and ciphertext.
pub(crate) fn encrypt_chunk(
    index: usize,
    plain: &[u8],
) -> Result<(ChunkDetails, Vec<u8>), EncryptionError> {
    let mut pre_hash = [0u8; 32];
    pre_hash.copy_from_slice(digest::digest(&digest::SHA256, plain).as_ref());
    let key = Zeroizing::new(pre_hash);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let nonce = chunk_nonce(&pre_hash);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|e| EncryptionError::ChunkEncryption {
            index,
            reason: e.to_string(),
        })?;

    let hash = Identity::from_slice(digest::digest(&digest::SHA512, &ciphertext).as_ref())
        .ok_or_else(|| EncryptionError::ChunkEncryption {
            index,
            reason: "unexpected digest length".to_string(),
        })?;
    let size = u32::try_from(plain.len()).map_err(|_| EncryptionError::ChunkEncryption {
        index,
        reason: format!("chunk of {} bytes is too large", plain.len()),
    })?;

    Ok((ChunkDetails { hash, pre_hash, size }, ciphertext))
}

/// Verify and decrypt one chunk.
pub(crate) fn decrypt_chunk(
    index: usize,
    chunk: &ChunkDetails,
    ciphertext: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let actual = digest::digest(&digest::SHA512, ciphertext);
    if actual.as_ref() != chunk.hash.as_bytes().as_slice() {
        return Err(EncryptionError::ChunkIntegrity { index });
    }

    let key = Zeroizing::new(chunk.pre_hash);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let plain = cipher
        .decrypt(Nonce::from_slice(&chunk_nonce(&chunk.pre_hash)), ciphertext)
        .map_err(|e| EncryptionError::ChunkDecryption {
            index,
            reason: e.to_string(),
        })?;

    if plain.len() != chunk.size as usize {
        return Err(EncryptionError::ChunkDecryption {
            index,
            reason: format!("expected {} bytes, got {}", chunk.size, plain.len()),
        });
    }
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn pattern(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_small_content_stays_inline() {
        let store = Arc::new(MemoryStore::new());
        let mut encryptor = SelfEncryptor::new(DataMap::new(), store.clone());
        encryptor.write(0, b"hello").unwrap();
        let map = encryptor.flush().unwrap();

        assert!(map.chunks.is_empty());
        assert_eq!(map.content, b"hello");
        assert!(store.is_empty());
    }

    #[test]
    fn test_large_content_is_chunked_and_readable() {
        let store = Arc::new(MemoryStore::new());
        let content = pattern(CHUNK_SIZE * 2 + 17);

        let mut encryptor = SelfEncryptor::new(DataMap::new(), store.clone());
        encryptor.write(0, &content).unwrap();
        let map = encryptor.flush().unwrap();
        assert_eq!(map.chunks.len(), 3);
        assert_eq!(map.size(), content.len() as u64);
        assert_eq!(store.len(), 3);

        // Fresh handle reads across a chunk boundary without loading everything
        let reader = SelfEncryptor::new(map, store);
        let offset = CHUNK_SIZE - 5;
        let read = reader.read(offset as u64, 10).unwrap();
        assert_eq!(read, &content[offset..offset + 10]);
        assert_eq!(reader.read(0, content.len() + 100).unwrap(), content);
    }

    #[test]
    fn test_read_past_end_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let mut encryptor = SelfEncryptor::new(DataMap::new(), store);
        encryptor.write(0, b"abc").unwrap();
        assert!(encryptor.read(3, 10).unwrap().is_empty());
        assert_eq!(encryptor.read(1, 10).unwrap(), b"bc");
    }

    #[test]
    fn test_write_with_gap_zero_fills() {
        let store = Arc::new(MemoryStore::new());
        let mut encryptor = SelfEncryptor::new(DataMap::new(), store);
        encryptor.write(4, b"xy").unwrap();
        assert_eq!(encryptor.size(), 6);
        assert_eq!(encryptor.read(0, 6).unwrap(), b"\0\0\0\0xy");
    }

    #[test]
    fn test_truncate_then_flush() {
        let store = Arc::new(MemoryStore::new());
        let mut encryptor = SelfEncryptor::new(DataMap::new(), store.clone());
        encryptor.write(0, &pattern(INLINE_THRESHOLD * 4)).unwrap();
        encryptor.flush().unwrap();

        let mut reopened = SelfEncryptor::new(encryptor.data_map().clone(), store);
        reopened.truncate(10).unwrap();
        assert!(reopened.is_dirty());
        let map = reopened.flush().unwrap();
        assert_eq!(map.size(), 10);
        assert_eq!(map.content, pattern(10));
    }

    #[test]
    fn test_identical_content_dedups_chunks() {
        let store = Arc::new(MemoryStore::new());
        let content = pattern(CHUNK_SIZE);

        let mut first = SelfEncryptor::new(DataMap::new(), store.clone());
        first.write(0, &content).unwrap();
        let map_a = first.flush().unwrap();

        let mut second = SelfEncryptor::new(DataMap::new(), store.clone());
        second.write(0, &content).unwrap();
        let map_b = second.flush().unwrap();

        assert_eq!(map_a, map_b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tampered_chunk_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut encryptor = SelfEncryptor::new(DataMap::new(), store.clone());
        encryptor.write(0, &pattern(INLINE_THRESHOLD + 1)).unwrap();
        let map = encryptor.flush().unwrap();

        let hash = map.chunks[0].hash;
        let mut blob = store.get(&hash).unwrap();
        blob[0] ^= 0xff;
        store.put(&hash, &blob).unwrap();

        let reader = SelfEncryptor::new(map, store);
        assert!(matches!(
            reader.read(0, 1),
            Err(EncryptionError::ChunkIntegrity { index: 0 })
        ));
    }

    #[test]
    fn test_delete_all_chunks() {
        let store = Arc::new(MemoryStore::new());
        let mut encryptor = SelfEncryptor::new(DataMap::new(), store.clone());
        encryptor.write(0, &pattern(CHUNK_SIZE + 1)).unwrap();
        encryptor.flush().unwrap();
        assert_eq!(store.len(), 2);

        encryptor.delete_all_chunks().unwrap();
        assert!(store.is_empty());
        // Second pass tolerates missing chunks
        encryptor.delete_all_chunks().unwrap();
    }
}
