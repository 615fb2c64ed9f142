//! Reed-Solomon Erasure Coding
//!
//! Implements (k, m) erasure coding where:
//! - k data shards (minimum required to reconstruct, default 4)
//! - m parity shards (redundancy, default 2)
//! - Any k of the k+m shards rebuild the input byte-for-byte
//!
//! Shards are `ceil(len / k)` bytes; the input is zero-padded up to
//! `shard_size * k`. The original length is not stored inside the shards,
//! so it must be handed back to [`ErasureEncoder::decode`].

use crate::error::{CumulusError, Result};
use crate::hash::ContentHash;
use crate::piece::PieceKind;
use crate::{DATA_SHARDS, PARITY_SHARDS};
use bytes::Bytes;
use rayon::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// GF(2^8) limits the total shard count
const MAX_TOTAL_SHARDS: usize = 256;

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
        }
    }
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(CumulusError::Configuration(
                "data_shards must be > 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(CumulusError::Configuration(
                "parity_shards must be > 0".to_string(),
            ));
        }
        if data_shards + parity_shards > MAX_TOTAL_SHARDS {
            return Err(CumulusError::Configuration(format!(
                "data_shards + parity_shards must be <= {}",
                MAX_TOTAL_SHARDS
            )));
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    /// Total number of shards
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Maximum number of lost shards that can be tolerated
    pub fn max_failures(&self) -> usize {
        self.parity_shards
    }

    /// Size of every shard produced for an input of `data_len` bytes.
    ///
    /// Ceiling division so no trailing bytes are dropped; never zero so an
    /// empty input still yields well-formed shards.
    pub fn shard_size(&self, data_len: usize) -> usize {
        data_len.div_ceil(self.data_shards).max(1)
    }

    /// Zero bytes appended to the last data shard for an input of `data_len` bytes
    pub fn padding(&self, data_len: usize) -> usize {
        self.shard_size(data_len) * self.data_shards - data_len
    }
}

/// A single shard of erasure-coded data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardData {
    /// Shard index (0 to total_shards-1)
    pub index: u32,
    /// Shard data
    pub data: Bytes,
    pub kind: PieceKind,
}

impl ShardData {
    pub fn new(index: u32, data: Bytes, kind: PieceKind) -> Self {
        Self { index, data, kind }
    }

    /// Get shard size
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn hash(&self) -> ContentHash {
        ContentHash::compute(&self.data)
    }
}

/// Shard bytes paired with the hash recorded when the shard was produced
#[derive(Debug, Clone)]
pub struct VerifiedShard {
    pub data: Bytes,
    pub expected: ContentHash,
}

impl VerifiedShard {
    pub fn new(data: Bytes, expected: ContentHash) -> Self {
        Self { data, expected }
    }
}

/// Reed-Solomon encoder/decoder
pub struct ErasureEncoder {
    config: ErasureConfig,
    encoder: ReedSolomon,
}

impl ErasureEncoder {
    /// Create a new encoder with default configuration (4, 2)
    pub fn new() -> Result<Self> {
        Self::with_config(ErasureConfig::default())
    }

    /// Create a new encoder with custom configuration
    pub fn with_config(config: ErasureConfig) -> Result<Self> {
        let encoder = ReedSolomon::new(config.data_shards, config.parity_shards)?;
        Ok(Self { config, encoder })
    }

    /// Get the erasure configuration
    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// Encode data into shards
    ///
    /// Returns data shards followed by parity shards, all the same length.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<ShardData>> {
        let mut shards = self.split_padded(data);
        self.encoder.encode(&mut shards)?;
        Ok(self.into_shard_data(shards))
    }

    /// Encode data into shards using parallel processing
    ///
    /// More efficient for large partitions (> 1MB)
    pub fn encode_parallel(&self, data: &[u8]) -> Result<Vec<ShardData>> {
        let shard_size = self.config.shard_size(data.len());
        let padded_size = shard_size * self.config.data_shards;
        let mut padded = data.to_vec();
        padded.resize(padded_size, 0);

        let mut shards: Vec<Vec<u8>> = padded
            .par_chunks(shard_size)
            .map(|c| c.to_vec())
            .collect();
        shards.extend((0..self.config.parity_shards).map(|_| vec![0u8; shard_size]));

        self.encoder.encode(&mut shards)?;

        let data_shards = self.config.data_shards;
        Ok(shards
            .into_par_iter()
            .enumerate()
            .map(|(i, shard)| {
                ShardData::new(
                    i as u32,
                    Bytes::from(shard),
                    PieceKind::for_index(i, data_shards),
                )
            })
            .collect())
    }

    /// Read a whole stream and encode it
    pub fn encode_reader<R: Read>(&self, mut reader: R) -> Result<Vec<ShardData>> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        if buf.len() > 1024 * 1024 {
            self.encode_parallel(&buf)
        } else {
            self.encode(&buf)
        }
    }

    /// Decode shards back into original data
    ///
    /// Requires at least `data_shards` number of shards.
    /// Missing shards should be represented as `None`.
    pub fn decode(&self, shards: &[Option<ShardData>], original_size: usize) -> Result<Bytes> {
        let data: Vec<Option<Bytes>> = shards
            .iter()
            .map(|s| s.as_ref().map(|s| s.data.clone()))
            .collect();
        self.reconstruct(data, original_size)
    }

    /// Check every supplied shard against its recorded hash, then decode.
    ///
    /// A shard whose bytes no longer match is reported as
    /// [`CumulusError::CorruptShard`] instead of being fed to the codec.
    pub fn decode_verified(
        &self,
        shards: &[Option<VerifiedShard>],
        original_size: usize,
    ) -> Result<Bytes> {
        for (index, shard) in shards.iter().enumerate() {
            if let Some(shard) = shard {
                if !shard.expected.verify(&shard.data) {
                    return Err(CumulusError::CorruptShard { index });
                }
            }
        }

        let data: Vec<Option<Bytes>> = shards
            .iter()
            .map(|s| s.as_ref().map(|s| s.data.clone()))
            .collect();
        self.reconstruct(data, original_size)
    }

    /// True when a complete shard set has consistent parity
    pub fn verify_shards(&self, shards: &[ShardData]) -> Result<bool> {
        if shards.len() != self.config.total_shards() {
            return Ok(false);
        }
        let size = shards.first().map(ShardData::size).unwrap_or(0);
        if shards.iter().any(|s| s.size() != size) {
            return Ok(false);
        }

        let slices: Vec<&[u8]> = shards.iter().map(|s| s.data.as_ref()).collect();
        Ok(self.encoder.verify(&slices)?)
    }

    fn reconstruct(&self, shards: Vec<Option<Bytes>>, original_size: usize) -> Result<Bytes> {
        let total_shards = self.config.total_shards();
        if shards.len() != total_shards {
            return Err(CumulusError::ShardCountMismatch {
                expected: total_shards,
                actual: shards.len(),
            });
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.config.data_shards {
            return Err(CumulusError::InsufficientShards {
                available,
                required: self.config.data_shards,
            });
        }

        let shard_size = shards
            .iter()
            .find_map(|s| s.as_ref().map(|s| s.len()))
            .unwrap_or(0);
        if original_size > shard_size * self.config.data_shards {
            return Err(CumulusError::ErasureCoding(format!(
                "original size {} exceeds {} shards of {} bytes",
                original_size, self.config.data_shards, shard_size
            )));
        }

        let mut shard_vecs: Vec<Option<Vec<u8>>> = shards
            .into_iter()
            .map(|opt| opt.map(|b| b.to_vec()))
            .collect();

        // Only data shards are needed to rebuild the input
        if shard_vecs
            .iter()
            .take(self.config.data_shards)
            .any(|s| s.is_none())
        {
            self.encoder.reconstruct_data(&mut shard_vecs)?;
        }

        let mut result = Vec::with_capacity(shard_size * self.config.data_shards);
        for shard in shard_vecs.iter().take(self.config.data_shards) {
            match shard {
                Some(shard) => result.extend_from_slice(shard),
                None => return Err(CumulusError::Internal("Reconstruction failed".to_string())),
            }
        }

        result.truncate(original_size);
        Ok(Bytes::from(result))
    }

    fn split_padded(&self, data: &[u8]) -> Vec<Vec<u8>> {
        let shard_size = self.config.shard_size(data.len());
        let padded_size = shard_size * self.config.data_shards;
        let mut padded = data.to_vec();
        padded.resize(padded_size, 0);

        let mut shards: Vec<Vec<u8>> = padded.chunks(shard_size).map(|c| c.to_vec()).collect();
        shards.extend((0..self.config.parity_shards).map(|_| vec![0u8; shard_size]));
        shards
    }

    fn into_shard_data(&self, shards: Vec<Vec<u8>>) -> Vec<ShardData> {
        shards
            .into_iter()
            .enumerate()
            .map(|(i, shard)| {
                ShardData::new(
                    i as u32,
                    Bytes::from(shard),
                    PieceKind::for_index(i, self.config.data_shards),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoder(data: usize, parity: usize) -> ErasureEncoder {
        ErasureEncoder::with_config(ErasureConfig::new(data, parity).unwrap()).unwrap()
    }

    /// Every subset of `0..n` with at least `k` members
    fn surviving_subsets(n: usize, k: usize) -> Vec<Vec<bool>> {
        (0u32..(1 << n))
            .filter(|mask| mask.count_ones() as usize >= k)
            .map(|mask| (0..n).map(|i| mask & (1 << i) != 0).collect())
            .collect()
    }

    #[test]
    fn test_erasure_config() {
        let config = ErasureConfig::default();
        assert_eq!(config.data_shards, 4);
        assert_eq!(config.parity_shards, 2);
        assert_eq!(config.total_shards(), 6);
        assert_eq!(config.max_failures(), 2);
    }

    #[test]
    fn test_invalid_config() {
        assert!(ErasureConfig::new(0, 2).is_err());
        assert!(ErasureConfig::new(4, 0).is_err());
        assert!(ErasureConfig::new(200, 100).is_err());
    }

    #[test]
    fn test_shard_size_rounds_up() {
        let config = ErasureConfig::new(4, 2).unwrap();
        assert_eq!(config.shard_size(16), 4);
        assert_eq!(config.shard_size(17), 5);
        assert_eq!(config.padding(17), 3);
        assert_eq!(config.shard_size(3), 1);
        assert_eq!(config.padding(3), 1);
        assert_eq!(config.shard_size(0), 1);
    }

    #[test]
    fn test_uneven_length_is_not_truncated() {
        let encoder = ErasureEncoder::new().unwrap();
        let original: Vec<u8> = (0..1001u32).map(|i| (i * 7 % 256) as u8).collect();

        let shards = encoder.encode(&original).unwrap();
        assert!(shards.iter().all(|s| s.size() == 251));

        let opts: Vec<Option<ShardData>> = shards.into_iter().map(Some).collect();
        let decoded = encoder.decode(&opts, original.len()).unwrap();
        assert_eq!(decoded.as_ref(), original.as_slice());
    }

    #[test]
    fn test_every_surviving_subset_reconstructs() {
        let encoder = encoder(4, 2);
        let original: Vec<u8> = (0..4099u32).map(|i| (i % 253) as u8).collect();
        let shards = encoder.encode(&original).unwrap();

        for keep in surviving_subsets(6, 4) {
            let opts: Vec<Option<ShardData>> = shards
                .iter()
                .zip(&keep)
                .map(|(s, k)| if *k { Some(s.clone()) } else { None })
                .collect();
            let decoded = encoder.decode(&opts, original.len()).unwrap();
            assert_eq!(decoded.as_ref(), original.as_slice(), "subset {:?}", keep);
        }
    }

    #[test]
    fn test_too_many_missing_shards() {
        let encoder = ErasureEncoder::new().unwrap();
        let original = b"test data";

        let shards = encoder.encode(original).unwrap();
        let mut opts: Vec<Option<ShardData>> = shards.into_iter().map(Some).collect();
        opts[0] = None;
        opts[2] = None;
        opts[5] = None;

        let result = encoder.decode(&opts, original.len());
        assert!(matches!(
            result,
            Err(CumulusError::InsufficientShards {
                available: 3,
                required: 4
            })
        ));
    }

    #[test]
    fn test_decode_verified_detects_corruption() {
        let encoder = ErasureEncoder::new().unwrap();
        let original = vec![9u8; 10_000];
        let shards = encoder.encode(&original).unwrap();

        let mut verified: Vec<Option<VerifiedShard>> = shards
            .iter()
            .map(|s| Some(VerifiedShard::new(s.data.clone(), s.hash())))
            .collect();

        let clean = encoder.decode_verified(&verified, original.len()).unwrap();
        assert_eq!(clean.as_ref(), original.as_slice());

        let shard = verified[1].as_mut().unwrap();
        let mut bytes = shard.data.to_vec();
        bytes[10] ^= 0x01;
        shard.data = Bytes::from(bytes);

        let result = encoder.decode_verified(&verified, original.len());
        assert!(matches!(result, Err(CumulusError::CorruptShard { index: 1 })));
    }

    #[test]
    fn test_wrong_slot_count() {
        let encoder = ErasureEncoder::new().unwrap();
        let shards = encoder.encode(b"abc").unwrap();
        let opts: Vec<Option<ShardData>> = shards.into_iter().take(5).map(Some).collect();
        assert!(matches!(
            encoder.decode(&opts, 3),
            Err(CumulusError::ShardCountMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        let encoder = ErasureEncoder::new().unwrap();
        let shards = encoder.encode(&[]).unwrap();
        assert_eq!(shards.len(), 6);
        let opts: Vec<Option<ShardData>> = shards.into_iter().map(Some).collect();
        assert!(encoder.decode(&opts, 0).unwrap().is_empty());
    }

    #[test]
    fn test_encode_parallel_matches_sequential() {
        let encoder = ErasureEncoder::new().unwrap();
        let original = vec![42u8; 3 * 1024 * 1024 + 5];

        let shards_seq = encoder.encode(&original).unwrap();
        let shards_par = encoder.encode_parallel(&original).unwrap();

        assert_eq!(shards_seq.len(), shards_par.len());
        for (s1, s2) in shards_seq.iter().zip(shards_par.iter()) {
            assert_eq!(s1.data, s2.data);
            assert_eq!(s1.index, s2.index);
            assert_eq!(s1.kind, s2.kind);
        }
    }

    #[test]
    fn test_verify_shards_spots_flipped_byte() {
        let encoder = ErasureEncoder::new().unwrap();
        let mut shards = encoder.encode(b"parity consistency").unwrap();
        assert!(encoder.verify_shards(&shards).unwrap());

        let mut bytes = shards[4].data.to_vec();
        bytes[0] ^= 0x01;
        shards[4].data = Bytes::from(bytes);
        assert!(!encoder.verify_shards(&shards).unwrap());
        assert!(!encoder.verify_shards(&shards[..5]).unwrap());
    }

    #[test]
    fn test_shard_kinds() {
        let encoder = ErasureEncoder::new().unwrap();
        let shards = encoder.encode_reader(&b"index test"[..]).unwrap();

        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(shard.index as usize, i);
            assert_eq!(shard.kind == PieceKind::Parity, i >= 4);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_roundtrip_with_losses(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            data_shards in 1usize..8,
            parity_shards in 1usize..4,
            seed in any::<u64>(),
        ) {
            let encoder = encoder(data_shards, parity_shards);
            let shards = encoder.encode(&data).unwrap();
            let total = data_shards + parity_shards;

            // Drop exactly `parity_shards` shards chosen from the seed
            let mut opts: Vec<Option<ShardData>> = shards.into_iter().map(Some).collect();
            let mut dropped = 0;
            let mut i = (seed % total as u64) as usize;
            while dropped < parity_shards {
                if opts[i].is_some() {
                    opts[i] = None;
                    dropped += 1;
                }
                i = (i + 1) % total;
            }

            let decoded = encoder.decode(&opts, data.len()).unwrap();
            prop_assert_eq!(decoded.as_ref(), data.as_slice());
        }
    }
}
