//! Piece metadata
//!
//! A piece is the unit handed to a single provider: one erasure shard of a
//! partition, or the whole file when it is replicated verbatim.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a piece carries original bytes or erasure redundancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Data,
    Parity,
}

impl PieceKind {
    /// Kind of the shard at `index` for a codec with `data_shards` data shards
    pub fn for_index(index: usize, data_shards: usize) -> Self {
        if index < data_shards {
            PieceKind::Data
        } else {
            PieceKind::Parity
        }
    }

    /// Wire form: `true` for data shards
    pub fn is_data(self) -> bool {
        self == PieceKind::Data
    }

    pub fn from_wire(is_data_shard: bool) -> Self {
        if is_data_shard {
            PieceKind::Data
        } else {
            PieceKind::Parity
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceKind::Data => write!(f, "data"),
            PieceKind::Parity => write!(f, "parity"),
        }
    }
}

/// Hash, size and position of one piece
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceMeta {
    /// Sequence index within the partition (0..data+parity)
    pub index: u32,
    pub kind: PieceKind,
    pub hash: ContentHash,
    pub size: u64,
}

impl PieceMeta {
    pub fn new(index: u32, kind: PieceKind, data: &[u8]) -> Self {
        Self {
            index,
            kind,
            hash: ContentHash::compute(data),
            size: data.len() as u64,
        }
    }

    /// Verify bytes against the recorded hash and size
    pub fn verify(&self, data: &[u8]) -> bool {
        data.len() as u64 == self.size && self.hash.verify(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_index() {
        assert_eq!(PieceKind::for_index(0, 4), PieceKind::Data);
        assert_eq!(PieceKind::for_index(3, 4), PieceKind::Data);
        assert_eq!(PieceKind::for_index(4, 4), PieceKind::Parity);
    }

    #[test]
    fn test_wire_flag() {
        assert!(PieceKind::Data.is_data());
        assert_eq!(PieceKind::from_wire(false), PieceKind::Parity);
    }

    #[test]
    fn test_meta_verify() {
        let meta = PieceMeta::new(2, PieceKind::Data, b"piece bytes");
        assert!(meta.verify(b"piece bytes"));
        assert!(!meta.verify(b"piece bytez"));
    }
}
