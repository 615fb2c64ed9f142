//! Content hashing
//!
//! BLAKE3 digests identify whole files (for deduplication) and individual
//! pieces (for integrity checks). A digest is a pure function of the bytes.

use crate::error::{CumulusError, Result};
use bytes::Bytes;
use std::fmt;
use std::path::Path;

/// BLAKE3 hash wrapper for content addressing
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    /// Compute BLAKE3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    /// Compute BLAKE3 hash of data using multiple threads (for large data)
    pub fn compute_parallel(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        Self(hasher.finalize())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    /// Parse a hash received over the wire
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = slice.try_into().map_err(|_| {
            CumulusError::InvalidHash(format!("expected 32 bytes, got {}", slice.len()))
        })?;
        Ok(Self::from_bytes(arr))
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hash =
            blake3::Hash::from_hex(hex).map_err(|e| CumulusError::InvalidHash(e.to_string()))?;
        Ok(Self(hash))
    }

    /// Verify that data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash and size of a whole file
#[derive(Debug, Clone)]
pub struct FileDigest {
    pub hash: ContentHash,
    pub size: u64,
    /// File contents, present only for files below the inline threshold
    pub inline: Option<Bytes>,
}

/// Hash a file in a single streaming pass.
///
/// Files smaller than `inline_threshold` are read into memory once and their
/// bytes are returned alongside the digest so they can ride along with the
/// existence check.
pub fn hash_file(path: impl AsRef<Path>, inline_threshold: u64) -> Result<FileDigest> {
    let path = path.as_ref();
    let size = std::fs::metadata(path)?.len();

    if size < inline_threshold {
        let data = std::fs::read(path)?;
        return Ok(FileDigest {
            hash: ContentHash::compute(&data),
            size: data.len() as u64,
            inline: Some(Bytes::from(data)),
        });
    }

    // memory-mapped and multithreaded for large files, buffered reads otherwise
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap_rayon(path)?;

    Ok(FileDigest {
        hash: ContentHash(hasher.finalize()),
        size: hasher.count(),
        inline: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hex_roundtrip() {
        let hash = ContentHash::compute(b"hello world");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_from_slice_rejects_short() {
        assert!(matches!(
            ContentHash::from_slice(&[1, 2, 3]),
            Err(CumulusError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let data = vec![7u8; 3 * 1024 * 1024];
        assert_eq!(
            ContentHash::compute(&data),
            ContentHash::compute_parallel(&data)
        );
    }

    #[test]
    fn test_streaming_matches_in_memory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..(3 * 256 * 1024 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        file.write_all(&data).unwrap();

        let digest = hash_file(file.path(), 8 * 1024).unwrap();
        assert_eq!(digest.hash, ContentHash::compute(&data));
        assert_eq!(digest.size, data.len() as u64);
        assert!(digest.inline.is_none());
    }

    #[test]
    fn test_small_file_is_inlined() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[42u8; 100]).unwrap();

        let digest = hash_file(file.path(), 8 * 1024).unwrap();
        assert_eq!(digest.size, 100);
        assert_eq!(digest.inline.as_deref(), Some(&[42u8; 100][..]));
    }

    #[test]
    fn test_verify_detects_change() {
        let hash = ContentHash::compute(b"abc");
        assert!(hash.verify(b"abc"));
        assert!(!hash.verify(b"abd"));
    }
}
