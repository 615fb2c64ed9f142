//! Cumulus Core Library
//!
//! Building blocks for the Cumulus client-side placement engine.
//! This crate provides:
//! - Reed-Solomon erasure coding (4 data + 2 parity shards by default)
//! - BLAKE3 content hashing for files and pieces
//! - Deterministic file partitioning for large uploads
//! - Self-deleting scratch files
//! - Ed25519 node identity used to sign tracker requests
//! - Password-based file encryption (AES-256-GCM, Argon2 key derivation)
//! - Common error type

pub mod crypto;
pub mod erasure;
pub mod error;
pub mod hash;
pub mod identity;
pub mod partition;
pub mod piece;
pub mod scratch;

pub use crypto::{decrypt_file, encrypt_file};
pub use erasure::{ErasureConfig, ErasureEncoder, ShardData, VerifiedShard};
pub use error::{CumulusError, ErrorKind, Result};
pub use hash::{hash_file, ContentHash, FileDigest};
pub use identity::NodeIdentity;
pub use partition::{PartitionFile, PartitionPlan, PartitionRange};
pub use piece::{PieceKind, PieceMeta};
pub use scratch::ScratchDir;

/// Default erasure coding configuration
/// - 4 data shards: minimum required to reconstruct
/// - 2 parity shards: tolerates the loss of any 2 pieces
pub const DATA_SHARDS: usize = 4;
pub const PARITY_SHARDS: usize = 2;
pub const TOTAL_SHARDS: usize = DATA_SHARDS + PARITY_SHARDS;

/// Files larger than this are split into partitions before encoding
pub const DEFAULT_PARTITION_SIZE: u64 = 256 * 1024 * 1024; // 256 MB

/// Files smaller than this travel inline with the existence check
pub const DEFAULT_INLINE_THRESHOLD: u64 = 8 * 1024; // 8 KB
