//! Error types for Cumulus
//!
//! Every failure carries a kind so callers can decide whether re-running a
//! whole upload or download is worthwhile. Nothing in this workspace retries
//! on its own.

use thiserror::Error;

/// Result type alias for Cumulus operations
pub type Result<T> = std::result::Result<T, CumulusError>;

/// Unified error type for Cumulus
#[derive(Error, Debug)]
pub enum CumulusError {
    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("Shard count mismatch: expected {expected}, got {actual}")]
    ShardCountMismatch { expected: usize, actual: usize },

    #[error("Invalid shard index: {index} (max: {max})")]
    InvalidShardIndex { index: usize, max: usize },

    // ===== Integrity Errors =====
    #[error("Corrupt shard {index}: content hash mismatch")]
    CorruptShard { index: usize },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    // ===== Identity Errors =====
    #[error("Node identity missing: {0}")]
    MissingIdentity(String),

    #[error("Signature error: {0}")]
    Signature(String),

    // ===== Encryption Errors =====
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    // ===== Network Errors =====
    #[error("Transport error talking to {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Timed out after {secs}s waiting for {endpoint}")]
    Timeout { endpoint: String, secs: u64 },

    // ===== Protocol Errors =====
    #[error("Tracker rejected request (code {code}): {message}")]
    Protocol { code: u32, message: String },

    #[error("Retrieval failed (code {code}): {message}")]
    RetrievalFailed { code: u32, message: String },

    #[error("Transfer grant for {provider} is expired or empty")]
    GrantExpired { provider: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Control Flow =====
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`CumulusError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transport,
    Protocol,
    Integrity,
    InsufficientShards,
    Io,
    Cancelled,
    Internal,
}

impl CumulusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CumulusError::Configuration(_) | CumulusError::MissingIdentity(_) => ErrorKind::Config,
            CumulusError::Transport { .. } | CumulusError::Timeout { .. } => ErrorKind::Transport,
            CumulusError::Protocol { .. }
            | CumulusError::RetrievalFailed { .. }
            | CumulusError::GrantExpired { .. }
            | CumulusError::UnexpectedResponse(_) => ErrorKind::Protocol,
            CumulusError::CorruptShard { .. }
            | CumulusError::HashMismatch { .. }
            | CumulusError::InvalidHash(_)
            | CumulusError::Decryption(_) => ErrorKind::Integrity,
            CumulusError::InsufficientShards { .. } => ErrorKind::InsufficientShards,
            CumulusError::Io(_) => ErrorKind::Io,
            CumulusError::Cancelled => ErrorKind::Cancelled,
            CumulusError::ErasureCoding(_)
            | CumulusError::ShardCountMismatch { .. }
            | CumulusError::InvalidShardIndex { .. }
            | CumulusError::Signature(_)
            | CumulusError::Encryption(_)
            | CumulusError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole operation from the start could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
    }

    pub fn transport(endpoint: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CumulusError::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

impl From<reed_solomon_erasure::Error> for CumulusError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        CumulusError::ErasureCoding(err.to_string())
    }
}
