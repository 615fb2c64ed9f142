//! Download orchestration
//!
//! The tracker answers a retrieval with either the inline bytes of a tiny
//! file, a single replicated block, or per-partition erasure blocks. Pieces
//! are fetched in sequence order until enough are in hand to decode; a piece
//! no provider returns is left as a hole for the codec to fill.
//!
//! Output is assembled in a staging file next to the destination and only
//! moved into place once the whole-file hash matches.

use crate::metrics;
use crate::progress::ProgressRegistry;
use crate::provider::{
    Candidate, FirstCandidate, ProviderEndpoint, ProviderSelector, ProviderTransport,
    TransferGrant,
};
use crate::sign::{sign_request, unix_now};
use crate::tracker::Tracker;
use bytes::Bytes;
use cumulus_core::{
    hash_file, ContentHash, CumulusError, ErasureConfig, ErasureEncoder, NodeIdentity,
    PartitionPlan, Result, ScratchDir, VerifiedShard, DEFAULT_PARTITION_SIZE,
};
use cumulus_protocol::tracker::{RetrieveBlock, RetrieveFileReq, RetrieveFileResp};
use cumulus_protocol::{CODE_OK, PROTOCOL_VERSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What to fetch and where to put it
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub file_hash: ContentHash,
    pub file_size: u64,
    pub output: PathBuf,
}

/// How the bytes were obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    Inline,
    Replica { provider: String },
    Erasure {
        partitions: usize,
        pieces: usize,
        holes: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub file_hash: ContentHash,
    pub file_size: u64,
    pub output: PathBuf,
    pub source: DownloadSource,
}

/// Tunables for downloads
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Used to recover partition lengths the tracker does not report
    pub partition_size: u64,
    /// Used when the tracker does not report shard counts
    pub erasure: ErasureConfig,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            partition_size: DEFAULT_PARTITION_SIZE,
            erasure: ErasureConfig::default(),
        }
    }
}

/// Pieces gathered for one partition
struct FetchedPartition {
    shards: Vec<Option<VerifiedShard>>,
    fetched: usize,
    holes: usize,
}

/// Drives downloads against a tracker and a provider transport
pub struct Downloader {
    tracker: Arc<dyn Tracker>,
    transport: Arc<dyn ProviderTransport>,
    selector: Arc<dyn ProviderSelector>,
    scratch: ScratchDir,
    settings: DownloadSettings,
    progress: ProgressRegistry,
}

impl Downloader {
    pub fn new(
        tracker: Arc<dyn Tracker>,
        transport: Arc<dyn ProviderTransport>,
        scratch: ScratchDir,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            tracker,
            transport,
            selector: Arc::new(FirstCandidate),
            scratch,
            settings,
            progress: ProgressRegistry::new(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn ProviderSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_progress(mut self, progress: ProgressRegistry) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    /// Fetch one file into `request.output`
    #[instrument(skip_all, fields(file_hash = %request.file_hash, file_size = request.file_size))]
    pub async fn download(
        &self,
        identity: &NodeIdentity,
        request: DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        if cancel.is_cancelled() {
            return Err(CumulusError::Cancelled);
        }

        let req = RetrieveFileReq {
            version: PROTOCOL_VERSION,
            node_id: identity.node_id().to_vec(),
            timestamp: unix_now(),
            file_hash: request.file_hash.to_vec(),
            file_size: request.file_size,
            sign: Vec::new(),
        };
        let resp = self
            .tracker
            .retrieve_file(sign_request(identity, req))
            .await?;
        if resp.code != CODE_OK {
            return Err(CumulusError::RetrievalFailed {
                code: resp.code,
                message: resp.err_msg,
            });
        }

        let key = request.file_hash.to_hex();
        let _progress = self.progress.track(&key, request.file_size);
        let staging = staging_file(&request.output)?;

        let source = if !resp.file_data.is_empty()
            || (resp.partition.is_empty() && request.file_size == 0)
        {
            self.write_inline(&request, &resp.file_data, &staging).await?
        } else if is_replica(&resp) {
            self.fetch_replica(&request, resp, &staging, &key, cancel)
                .await?
        } else {
            self.fetch_erasure(&request, resp, &staging, &key, cancel)
                .await?
        };

        verify_output(staging.path(), &request).await?;
        staging
            .persist(&request.output)
            .map_err(|e| CumulusError::Io(e.error))?;
        self.progress.finish(&key);

        info!(output = %request.output.display(), source = ?source, "Download finished");
        Ok(DownloadReport {
            file_hash: request.file_hash,
            file_size: request.file_size,
            output: request.output,
            source,
        })
    }

    async fn write_inline(
        &self,
        request: &DownloadRequest,
        data: &[u8],
        staging: &NamedTempFile,
    ) -> Result<DownloadSource> {
        debug!(bytes = data.len(), "Tracker returned inline contents");
        tokio::fs::write(staging.path(), data).await?;
        self.progress
            .advance(&request.file_hash.to_hex(), data.len() as u64);
        Ok(DownloadSource::Inline)
    }

    /// Whole file from the first provider that answers, in selector order
    #[instrument(skip_all)]
    async fn fetch_replica(
        &self,
        request: &DownloadRequest,
        mut resp: RetrieveFileResp,
        staging: &NamedTempFile,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadSource> {
        let block = resp
            .partition
            .pop()
            .and_then(|mut p| p.block.pop())
            .ok_or_else(|| CumulusError::UnexpectedResponse("replica without block".into()))?;

        let mut last_error = None;
        for Candidate { endpoint, grant, .. } in self.selector.rank(candidates_for(&block)) {
            match self
                .transport
                .retrieve_piece(&endpoint, grant, &request.file_hash, staging.path(), cancel)
                .await
            {
                Ok(bytes) => {
                    metrics::record_bytes_downloaded(bytes);
                    self.progress.advance(key, bytes);
                    return Ok(DownloadSource::Replica {
                        provider: endpoint.to_string(),
                    });
                }
                Err(CumulusError::Cancelled) => return Err(CumulusError::Cancelled),
                Err(e) => {
                    warn!(provider = %endpoint, error = %e, "Replica retrieval failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CumulusError::InsufficientShards {
            available: 0,
            required: 1,
        }))
    }

    async fn fetch_erasure(
        &self,
        request: &DownloadRequest,
        resp: RetrieveFileResp,
        staging: &NamedTempFile,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadSource> {
        let config = shard_config(&resp, self.settings.erasure)?;
        let encoder = Arc::new(ErasureEncoder::with_config(config)?);
        let plan = PartitionPlan::compute(request.file_size, self.settings.partition_size)?;

        let mut out = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(staging.path())
            .await?;

        let partitions = resp.partition.len();
        let (mut pieces, mut holes) = (0, 0);
        for (index, partition) in resp.partition.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CumulusError::Cancelled);
            }

            let size = if partition.size > 0 {
                partition.size
            } else {
                plan.ranges.get(index).map(|r| r.len).ok_or_else(|| {
                    CumulusError::UnexpectedResponse(format!(
                        "partition {} has no size and falls outside the local plan",
                        index
                    ))
                })?
            };

            let fetched = self
                .fetch_partition(index, partition.block, config, key, cancel)
                .await?;
            pieces += fetched.fetched;
            holes += fetched.holes;

            let encoder = encoder.clone();
            let shards = fetched.shards;
            let decoded = tokio::task::spawn_blocking(move || {
                encoder.decode_verified(&shards, size as usize)
            })
            .await
            .map_err(|e| CumulusError::Internal(format!("decode task failed: {}", e)))??;

            out.write_all(&decoded).await?;
            debug!(partition = index, bytes = decoded.len(), "Partition decoded");
        }
        out.flush().await?;

        Ok(DownloadSource::Erasure {
            partitions,
            pieces,
            holes,
        })
    }

    /// Fetch blocks in sequence order until `data_shards` are in hand
    #[instrument(skip_all, fields(partition = index))]
    async fn fetch_partition(
        &self,
        index: usize,
        mut blocks: Vec<RetrieveBlock>,
        config: ErasureConfig,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPartition> {
        let total = config.total_shards();
        let mut shards: Vec<Option<VerifiedShard>> = vec![None; total];
        let (mut data, mut parity, mut holes) = (0usize, 0usize, 0usize);

        blocks.sort_by_key(|b| b.block_seq);
        for block in blocks {
            if data + parity >= config.data_shards {
                break;
            }

            let seq = block.block_seq as usize;
            if seq >= total {
                return Err(CumulusError::InvalidShardIndex {
                    index: seq,
                    max: total - 1,
                });
            }
            if shards[seq].is_some() {
                debug!(seq, "Duplicate block, already fetched");
                continue;
            }
            let hash = ContentHash::from_slice(&block.hash)?;

            match self.fetch_block(index, &block, &hash, cancel).await? {
                Some(bytes) => {
                    self.progress.advance(key, bytes.len() as u64);
                    shards[seq] = Some(VerifiedShard::new(bytes, hash));
                    if block.is_data_shard {
                        data += 1;
                    } else {
                        parity += 1;
                    }
                }
                None => {
                    warn!(seq, "No provider returned piece, leaving a hole");
                    holes += 1;
                }
            }
        }

        debug!(data, parity, holes, "Partition pieces fetched");
        Ok(FetchedPartition {
            shards,
            fetched: data + parity,
            holes,
        })
    }

    /// One piece into scratch space, then into memory; `None` when every
    /// candidate failed
    async fn fetch_block(
        &self,
        partition: usize,
        block: &RetrieveBlock,
        hash: &ContentHash,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>> {
        for Candidate { endpoint, grant, .. } in self.selector.rank(candidates_for(block)) {
            let (file, scratch_path) = self
                .scratch
                .create(&format!("{}.{}", partition, block.block_seq))?;
            drop(file);

            match self
                .transport
                .retrieve_piece(&endpoint, grant, hash, &scratch_path, cancel)
                .await
            {
                Ok(bytes) => {
                    metrics::record_bytes_downloaded(bytes);
                    let data = tokio::fs::read(&scratch_path).await?;
                    return Ok(Some(Bytes::from(data)));
                }
                Err(CumulusError::Cancelled) => return Err(CumulusError::Cancelled),
                Err(e) => {
                    warn!(seq = block.block_seq, provider = %endpoint, error = %e, "Piece retrieval failed");
                }
            }
        }
        Ok(None)
    }
}

fn is_replica(resp: &RetrieveFileResp) -> bool {
    resp.data_piece_count == 0
        && resp.verify_piece_count == 0
        && resp.partition.len() == 1
        && resp.partition[0].block.len() == 1
}

/// Shard counts from the response, defaults where it reports zero
fn shard_config(resp: &RetrieveFileResp, default: ErasureConfig) -> Result<ErasureConfig> {
    let data = match resp.data_piece_count {
        0 => default.data_shards,
        n => n as usize,
    };
    let parity = match resp.verify_piece_count {
        0 => default.parity_shards,
        n => n as usize,
    };
    ErasureConfig::new(data, parity)
}

fn candidates_for(block: &RetrieveBlock) -> Vec<Candidate> {
    block
        .store_node
        .iter()
        .map(|node| Candidate {
            endpoint: ProviderEndpoint::new(node.node_id.clone(), node.server.clone(), node.port),
            grant: TransferGrant::new(node.auth.clone(), node.ticket.clone(), node.time),
            spare: false,
        })
        .collect()
}

/// Hidden temp file in the destination directory so the final move is a rename
fn staging_file(output: &Path) -> Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(tempfile::Builder::new()
        .prefix(".cumulus-")
        .suffix(".part")
        .tempfile_in(dir)?)
}

async fn verify_output(path: &Path, request: &DownloadRequest) -> Result<()> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || hash_file(path, 0))
        .await
        .map_err(|e| CumulusError::Internal(format!("hashing task failed: {}", e)))??;

    if digest.hash != request.file_hash || digest.size != request.file_size {
        return Err(CumulusError::HashMismatch {
            expected: format!("{} ({} bytes)", request.file_hash, request.file_size),
            actual: format!("{} ({} bytes)", digest.hash, digest.size),
        });
    }
    Ok(())
}
