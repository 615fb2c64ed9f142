//! Existence check and deduplication
//!
//! Before any byte leaves the machine the tracker is asked whether a file
//! with this hash and size is already stored. The answer also decides the
//! storage strategy for the upload.

use crate::provider::{ProviderEndpoint, TransferGrant};
use crate::sign::{sign_request, unix_now};
use crate::tracker::{ensure_ok, Tracker};
use cumulus_core::{hash_file, CumulusError, ErasureConfig, FileDigest, NodeIdentity, Result};
use cumulus_protocol::tracker::{CheckFileExistReq, FilePath, FileStoreType};
use cumulus_protocol::PROTOCOL_VERSION;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, instrument};

/// Everything the tracker needs to know about a local file
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    /// Remote folder the file lands in
    pub parent: String,
    pub digest: FileDigest,
    /// Unix seconds
    pub mod_time: u64,
    pub interactive: bool,
    pub new_version: bool,
}

impl FileDescriptor {
    /// Hash `path` and collect its name and modification time
    pub fn from_path(path: impl AsRef<Path>, parent: &str, inline_threshold: u64) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(CumulusError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let mod_time = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            parent: parent.to_string(),
            digest: hash_file(path, inline_threshold)?,
            mod_time,
            interactive: false,
            new_version: false,
        })
    }

    pub fn size(&self) -> u64 {
        self.digest.size
    }
}

/// A provider that should receive a full replica, with its grant
#[derive(Debug)]
pub struct ReplicaTarget {
    pub endpoint: ProviderEndpoint,
    pub grant: TransferGrant,
}

/// How the tracker wants the file stored
#[derive(Debug)]
pub enum StorageStrategy {
    /// Shard counts as reported; zero means "use the configured default"
    Erasure { data: u32, parity: u32 },
    Replica { providers: Vec<ReplicaTarget> },
}

impl StorageStrategy {
    /// Codec parameters for an erasure upload, falling back to `default`
    /// for counts the tracker left at zero
    pub fn erasure_config(&self, default: ErasureConfig) -> Result<Option<ErasureConfig>> {
        match self {
            StorageStrategy::Erasure { data, parity } => {
                let data = if *data == 0 { default.data_shards } else { *data as usize };
                let parity = if *parity == 0 {
                    default.parity_shards
                } else {
                    *parity as usize
                };
                ErasureConfig::new(data, parity).map(Some)
            }
            StorageStrategy::Replica { .. } => Ok(None),
        }
    }
}

/// Tracker's answer to an existence check
#[derive(Debug)]
pub struct ExistenceOutcome {
    /// Identical content is already stored; nothing to transfer
    pub exists: bool,
    /// The bytes travelled inside the request; nothing to transfer
    pub inline_stored: bool,
    pub strategy: StorageStrategy,
}

impl ExistenceOutcome {
    pub fn needs_transfer(&self) -> bool {
        !self.exists && !self.inline_stored
    }
}

/// Ask the tracker whether `file` is already stored
#[instrument(skip_all, fields(file_hash = %file.digest.hash, file_size = file.digest.size))]
pub async fn check_exists(
    tracker: &dyn Tracker,
    identity: &NodeIdentity,
    file: &FileDescriptor,
) -> Result<ExistenceOutcome> {
    let inline = file.digest.inline.as_ref();
    let req = CheckFileExistReq {
        version: PROTOCOL_VERSION,
        node_id: identity.node_id().to_vec(),
        timestamp: unix_now(),
        parent: Some(FilePath::new(file.parent.clone())),
        file_hash: file.digest.hash.to_vec(),
        file_size: file.digest.size,
        file_name: file.name.clone(),
        file_mod_time: file.mod_time,
        file_data: inline.map(|b| b.to_vec()).unwrap_or_default(),
        interactive: file.interactive,
        new_version: file.new_version,
        sign: Vec::new(),
    };

    let resp = ensure_ok(tracker.check_file_exist(sign_request(identity, req)).await?)?;

    let store_type = FileStoreType::try_from(resp.store_type).map_err(|_| {
        CumulusError::UnexpectedResponse(format!("unknown store type {}", resp.store_type))
    })?;
    let strategy = match store_type {
        FileStoreType::ErasureCode => StorageStrategy::Erasure {
            data: resp.data_piece_count,
            parity: resp.verify_piece_count,
        },
        FileStoreType::MultiReplica => StorageStrategy::Replica {
            providers: resp
                .provider
                .into_iter()
                .map(|p| ReplicaTarget {
                    endpoint: ProviderEndpoint::new(p.node_id, p.server, p.port),
                    grant: TransferGrant::new(p.auth, p.ticket, p.time),
                })
                .collect(),
        },
    };

    let outcome = ExistenceOutcome {
        exists: resp.exist,
        inline_stored: inline.is_some(),
        strategy,
    };
    debug!(
        exists = outcome.exists,
        inline = outcome.inline_stored,
        "Existence check answered"
    );
    Ok(outcome)
}
