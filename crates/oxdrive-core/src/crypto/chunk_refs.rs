//! Reference counts for shared content chunks.
//!
//! Convergent encryption makes identical plaintext land in the same chunk, and
//! data maps can be copied between entries, so a chunk may back any number of
//! files. Each stored chunk has a companion counter blob holding the number of
//! committed data maps that reference it. A chunk is deleted only when its
//! count drops to zero.
//!
//! A chunk without a counter counts as referenced once.

use ring::digest;
use tracing::trace;

use super::{DataMap, EncryptionError};
use crate::drive::path::{IDENTITY_SIZE, Identity};
use crate::storage::Storage;

const REF_DOMAIN: &[u8] = b"oxdrive-chunk-refs-v1";

/// Storage id of the counter for the chunk stored under `chunk`.
pub fn ref_id(chunk: &Identity) -> Identity {
    let mut ctx = digest::Context::new(&digest::SHA512);
    ctx.update(REF_DOMAIN);
    ctx.update(chunk.as_bytes());
    let digest = ctx.finish();
    let mut bytes = [0u8; IDENTITY_SIZE];
    bytes.copy_from_slice(digest.as_ref());
    Identity::from_bytes(bytes)
}

/// Current reference count of `chunk`, zero if it has no counter.
pub fn ref_count<S: Storage + ?Sized>(
    storage: &S,
    chunk: &Identity,
) -> Result<u64, EncryptionError> {
    match storage.get(&ref_id(chunk)) {
        Ok(blob) => decode(chunk, &blob),
        Err(e) if e.is_not_found() => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Record one more reference to every chunk of `data_map`.
pub fn retain<S: Storage + ?Sized>(storage: &S, data_map: &DataMap) -> Result<(), EncryptionError> {
    for chunk in &data_map.chunks {
        let count = ref_count(storage, &chunk.hash)? + 1;
        storage.put(&ref_id(&chunk.hash), &count.to_be_bytes())?;
        trace!(chunk = %chunk.hash.short(), count, "Chunk retained");
    }
    Ok(())
}

/// Drop one reference to every chunk of `data_map`, deleting chunks that are
/// no longer referenced. Returns how many chunks were deleted.
///
/// Chunks and counters that are already gone are skipped.
pub fn release<S: Storage + ?Sized>(
    storage: &S,
    data_map: &DataMap,
) -> Result<usize, EncryptionError> {
    let mut deleted = 0;
    for chunk in &data_map.chunks {
        let counter = ref_id(&chunk.hash);
        let count = match storage.get(&counter) {
            Ok(blob) => decode(&chunk.hash, &blob)?,
            Err(e) if e.is_not_found() => 1,
            Err(e) => return Err(e.into()),
        };

        if count > 1 {
            storage.put(&counter, &(count - 1).to_be_bytes())?;
            trace!(chunk = %chunk.hash.short(), count = count - 1, "Chunk released");
            continue;
        }

        for id in [&chunk.hash, &counter] {
            match storage.delete(id) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        trace!(chunk = %chunk.hash.short(), "Chunk deleted");
        deleted += 1;
    }
    Ok(deleted)
}

fn decode(chunk: &Identity, blob: &[u8]) -> Result<u64, EncryptionError> {
    <[u8; 8]>::try_from(blob)
        .map(u64::from_be_bytes)
        .map_err(|_| EncryptionError::CorruptRefCount {
            chunk: chunk.short(),
        })
}
