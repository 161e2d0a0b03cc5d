//! Data map: the content descriptor stored in a file's metadata.

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use super::EncryptionError;
use crate::drive::path::Identity;

/// One encrypted chunk of a file.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDetails {
    /// Storage address: SHA-512 of the ciphertext.
    pub hash: Identity,
    /// SHA-256 of the plaintext; doubles as the chunk key.
    #[serde_as(as = "Base64")]
    pub pre_hash: [u8; 32],
    /// Plaintext length of this chunk.
    pub size: u32,
}

/// Serialized description of a file's content.
///
/// Either `content` holds the bytes inline (small files) or `chunks` lists the
/// encrypted chunks in order. Never both.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMap {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkDetails>,
    #[serde_as(as = "Base64")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<u8>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plaintext size described by this map.
    pub fn size(&self) -> u64 {
        if self.chunks.is_empty() {
            self.content.len() as u64
        } else {
            self.chunks.iter().map(|c| u64::from(c.size)).sum()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.content.is_empty()
    }

    pub fn serialise(&self) -> Result<Vec<u8>, EncryptionError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, EncryptionError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_map_size() {
        let map = DataMap::new();
        assert!(map.is_empty());
        assert_eq!(map.size(), 0);
        assert_eq!(map.serialise().unwrap(), b"{}");
    }

    #[test]
    fn test_size_sums_chunks() {
        let map = DataMap {
            chunks: vec![
                ChunkDetails {
                    hash: Identity::random(),
                    pre_hash: [1; 32],
                    size: 10,
                },
                ChunkDetails {
                    hash: Identity::random(),
                    pre_hash: [2; 32],
                    size: 5,
                },
            ],
            content: Vec::new(),
        };
        assert_eq!(map.size(), 15);
        let parsed = DataMap::parse(&map.serialise().unwrap()).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            DataMap::parse(b"not json"),
            Err(EncryptionError::DataMapParse(_))
        ));
    }
}
