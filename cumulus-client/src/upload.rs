//! Upload orchestration
//!
//! ```text
//! CheckingExistence -> Done                      (deduplicated or inline)
//!                   -> Partitioning -> Splitting -> PiecePreparing
//!                      -> Transferring -> Finalizing -> Done
//!                   -> Transferring -> Finalizing -> Done   (replicas)
//! ```
//!
//! Any state may move to `Aborted`. Scratch partitions and pieces are
//! `TempPath` guards owned by this call, so they vanish on every exit.

use crate::existence::{check_exists, FileDescriptor, ReplicaTarget, StorageStrategy};
use crate::metrics;
use crate::progress::ProgressRegistry;
use crate::provider::{
    Candidate, FirstCandidate, PieceUpload, ProviderEndpoint, ProviderSelector,
    ProviderTransport, TransferGrant,
};
use crate::sign::{sign_request, unix_now};
use crate::tracker::{ensure_ok, Tracker};
use cumulus_core::partition::split_file;
use cumulus_core::{
    ContentHash, CumulusError, ErasureConfig, ErasureEncoder, NodeIdentity, PieceMeta,
    Result, ScratchDir, DEFAULT_INLINE_THRESHOLD, DEFAULT_PARTITION_SIZE,
};
use cumulus_protocol::tracker::{
    ErasureCodePartition, FilePath, FileStoreType, PieceAssignment, PieceHashAndSize,
    SplitPartition, StoreBlock, StorePartition, UploadFileDoneReq, UploadFilePrepareReq,
};
use cumulus_protocol::PROTOCOL_VERSION;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Inputs above this size are encoded with the rayon path
const PARALLEL_ENCODE_THRESHOLD: usize = 1024 * 1024;

/// Stages of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    CheckingExistence,
    Partitioning,
    Splitting,
    PiecePreparing,
    Transferring,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::CheckingExistence => "checking-existence",
            UploadState::Partitioning => "partitioning",
            UploadState::Splitting => "splitting",
            UploadState::PiecePreparing => "piece-preparing",
            UploadState::Transferring => "transferring",
            UploadState::Finalizing => "finalizing",
            UploadState::Done => "done",
            UploadState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Storage strategy of a completed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Erasure,
    Replica,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Erasure => "erasure",
            StrategyKind::Replica => "replica",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    /// The tracker already had the content
    Deduplicated,
    /// The bytes rode along with the existence check
    Inline,
    Stored {
        strategy: StrategyKind,
        partitions: usize,
        pieces: usize,
    },
}

impl UploadResult {
    fn label(&self) -> &'static str {
        match self {
            UploadResult::Deduplicated => "deduplicated",
            UploadResult::Inline => "inline",
            UploadResult::Stored { .. } => "stored",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub file_hash: ContentHash,
    pub file_size: u64,
    pub path: PathBuf,
    pub result: UploadResult,
    /// Replica providers that failed; always 0 for erasure uploads
    pub replica_failures: usize,
}

/// What to upload and where it goes
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    /// Remote destination folder
    pub parent: String,
    pub new_version: bool,
    pub interactive: bool,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>, parent: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parent: parent.into(),
            new_version: false,
            interactive: false,
        }
    }

    pub fn new_version(mut self, new_version: bool) -> Self {
        self.new_version = new_version;
        self
    }
}

/// Tunables for uploads
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub partition_size: u64,
    pub inline_threshold: u64,
    /// Used when the tracker does not name shard counts
    pub erasure: ErasureConfig,
    /// Pieces of one partition in flight after piece 0
    pub parallel_pieces: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            partition_size: DEFAULT_PARTITION_SIZE,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            erasure: ErasureConfig::default(),
            parallel_pieces: 4,
        }
    }
}

/// One coded piece in scratch space
struct EncodedPiece {
    meta: PieceMeta,
    path: TempPath,
}

/// Coded pieces of one partition plus its original length
struct EncodedPartition {
    index: u32,
    size: u64,
    pieces: Vec<EncodedPiece>,
}

/// Drives uploads against a tracker and a provider transport
pub struct Uploader {
    tracker: Arc<dyn Tracker>,
    transport: Arc<dyn ProviderTransport>,
    selector: Arc<dyn ProviderSelector>,
    scratch: ScratchDir,
    settings: UploadSettings,
    progress: ProgressRegistry,
}

impl Uploader {
    pub fn new(
        tracker: Arc<dyn Tracker>,
        transport: Arc<dyn ProviderTransport>,
        scratch: ScratchDir,
        settings: UploadSettings,
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

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Upload one local file
    #[instrument(skip_all, fields(path = %request.path.display(), parent = %request.parent))]
    pub async fn upload(
        &self,
        identity: &NodeIdentity,
        request: UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadReport> {
        let mut state = UploadState::CheckingExistence;
        match self.run(identity, &request, cancel, &mut state).await {
            Ok(report) => {
                debug!(state = %UploadState::Done, "Upload state");
                metrics::record_upload(report.result.label());
                info!(
                    file_hash = %report.file_hash,
                    size = report.file_size,
                    result = ?report.result,
                    "Upload finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(state = %UploadState::Aborted, from = %state, error = %e, "Upload aborted");
                metrics::record_upload("aborted");
                Err(e)
            }
        }
    }

    fn enter(state: &mut UploadState, next: UploadState, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CumulusError::Cancelled);
        }
        debug!(from = %state, to = %next, "Upload state");
        *state = next;
        Ok(())
    }

    async fn run(
        &self,
        identity: &NodeIdentity,
        request: &UploadRequest,
        cancel: &CancellationToken,
        state: &mut UploadState,
    ) -> Result<UploadReport> {
        Self::enter(state, UploadState::CheckingExistence, cancel)?;

        let path = request.path.clone();
        let parent = request.parent.clone();
        let threshold = self.settings.inline_threshold;
        let mut file = tokio::task::spawn_blocking(move || {
            FileDescriptor::from_path(&path, &parent, threshold)
        })
        .await
        .map_err(|e| CumulusError::Internal(format!("hashing task failed: {}", e)))??;
        file.new_version = request.new_version;
        file.interactive = request.interactive;

        let outcome = check_exists(self.tracker.as_ref(), identity, &file).await?;
        let report = |result, replica_failures| UploadReport {
            file_hash: file.digest.hash,
            file_size: file.digest.size,
            path: request.path.clone(),
            result,
            replica_failures,
        };

        if outcome.exists {
            info!(file_hash = %file.digest.hash, "Content already stored, skipping transfer");
            return Ok(report(UploadResult::Deduplicated, 0));
        }
        if outcome.inline_stored {
            debug!(file_hash = %file.digest.hash, "Stored inline with existence check");
            return Ok(report(UploadResult::Inline, 0));
        }

        let key = file.digest.hash.to_hex();
        match outcome.strategy {
            StorageStrategy::Replica { providers } => {
                let (result, failures) = self
                    .upload_replicas(identity, &file, providers, &key, cancel, state)
                    .await?;
                Ok(report(result, failures))
            }
            strategy @ StorageStrategy::Erasure { .. } => {
                let config = strategy
                    .erasure_config(self.settings.erasure)?
                    .ok_or_else(|| CumulusError::Internal("erasure strategy without config".into()))?;
                let result = self
                    .upload_erasure(identity, &file, config, &key, cancel, state)
                    .await?;
                Ok(report(result, 0))
            }
        }
    }

    async fn upload_erasure(
        &self,
        identity: &NodeIdentity,
        file: &FileDescriptor,
        config: ErasureConfig,
        key: &str,
        cancel: &CancellationToken,
        state: &mut UploadState,
    ) -> Result<UploadResult> {
        Self::enter(state, UploadState::Partitioning, cancel)?;
        let path = file.path.clone();
        let threshold = self.settings.partition_size;
        let scratch = self.scratch.clone();
        let partitions = tokio::task::spawn_blocking(move || split_file(&path, threshold, &scratch))
            .await
            .map_err(|e| CumulusError::Internal(format!("partition task failed: {}", e)))??;
        debug!(partitions = partitions.len(), "File partitioned");

        Self::enter(state, UploadState::Splitting, cancel)?;
        let encoder = Arc::new(ErasureEncoder::with_config(config)?);
        let mut encoded = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let encoder = encoder.clone();
            let scratch = self.scratch.clone();
            let prefix = format!("{}.{}", &key[..16], partition.index());
            let coded = tokio::task::spawn_blocking(move || {
                let data = partition.read()?;
                let shards = if data.len() > PARALLEL_ENCODE_THRESHOLD {
                    encoder.encode_parallel(&data)?
                } else {
                    encoder.encode(&data)?
                };
                drop(data);

                let mut pieces = Vec::with_capacity(shards.len());
                for shard in shards {
                    let meta = PieceMeta::new(shard.index, shard.kind, &shard.data);
                    let path = scratch.write(&format!("{}.{}", prefix, shard.index), &shard.data)?;
                    pieces.push(EncodedPiece { meta, path });
                }
                Ok::<_, CumulusError>(EncodedPartition {
                    index: partition.index(),
                    size: partition.len(),
                    pieces,
                })
            })
            .await
            .map_err(|e| CumulusError::Internal(format!("encode task failed: {}", e)))??;
            debug!(partition = coded.index, pieces = coded.pieces.len(), "Partition encoded");
            encoded.push(coded);

            if cancel.is_cancelled() {
                return Err(CumulusError::Cancelled);
            }
        }

        Self::enter(state, UploadState::PiecePreparing, cancel)?;
        let assignments = self.prepare(identity, file, &encoded).await?;

        Self::enter(state, UploadState::Transferring, cancel)?;
        let total_bytes: u64 = encoded
            .iter()
            .flat_map(|p| p.pieces.iter())
            .map(|p| p.meta.size)
            .sum();
        let _progress = self.progress.track(key, total_bytes);

        let mut stored = Vec::with_capacity(encoded.len());
        for (partition, assignment) in encoded.iter().zip(assignments) {
            let blocks = self.transfer_partition(partition, assignment, key, cancel).await?;
            stored.push(StorePartition {
                block: blocks,
                size: partition.size,
            });
        }

        Self::enter(state, UploadState::Finalizing, cancel)?;
        let pieces = stored.iter().map(|p| p.block.len()).sum();
        let partitions = stored.len();
        self.finalize(identity, file, stored, FileStoreType::ErasureCode)
            .await?;
        self.progress.finish(key);

        Ok(UploadResult::Stored {
            strategy: StrategyKind::Erasure,
            partitions,
            pieces,
        })
    }

    /// Send every piece hash and size; get back one assignment per piece
    #[instrument(skip_all, fields(file_hash = %file.digest.hash))]
    async fn prepare(
        &self,
        identity: &NodeIdentity,
        file: &FileDescriptor,
        encoded: &[EncodedPartition],
    ) -> Result<Vec<ErasureCodePartition>> {
        let req = UploadFilePrepareReq {
            version: PROTOCOL_VERSION,
            node_id: identity.node_id().to_vec(),
            timestamp: unix_now(),
            file_hash: file.digest.hash.to_vec(),
            file_size: file.digest.size,
            partition: encoded
                .iter()
                .map(|p| SplitPartition {
                    piece: p
                        .pieces
                        .iter()
                        .map(|piece| PieceHashAndSize {
                            hash: piece.meta.hash.to_vec(),
                            size: piece.meta.size,
                        })
                        .collect(),
                })
                .collect(),
            sign: Vec::new(),
        };

        let resp = ensure_ok(
            self.tracker
                .upload_file_prepare(sign_request(identity, req))
                .await?,
        )?;

        if resp.partition.len() != encoded.len() {
            return Err(CumulusError::UnexpectedResponse(format!(
                "prepare returned {} partitions for {}",
                resp.partition.len(),
                encoded.len()
            )));
        }
        for (sent, got) in encoded.iter().zip(&resp.partition) {
            if got.piece.len() != sent.pieces.len() {
                return Err(CumulusError::UnexpectedResponse(format!(
                    "prepare returned {} assignments for {} pieces in partition {}",
                    got.piece.len(),
                    sent.pieces.len(),
                    sent.index
                )));
            }
        }

        Ok(resp.partition)
    }

    /// Piece 0 first and acknowledged, then the rest concurrently
    #[instrument(skip_all, fields(partition = partition.index))]
    async fn transfer_partition(
        &self,
        partition: &EncodedPartition,
        assignment: ErasureCodePartition,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoreBlock>> {
        let mut jobs = partition.pieces.iter().zip(assignment.piece);
        let mut blocks = Vec::with_capacity(partition.pieces.len());

        let Some((first_piece, first_assignment)) = jobs.next() else {
            return Ok(blocks);
        };
        blocks.push(
            self.transfer_piece(first_piece, first_assignment, true, key, cancel)
                .await?,
        );

        let rest: Vec<StoreBlock> = stream::iter(jobs)
            .map(|(piece, assignment)| self.transfer_piece(piece, assignment, false, key, cancel))
            .buffer_unordered(self.settings.parallel_pieces.max(1))
            .try_collect()
            .await?;
        blocks.extend(rest);
        blocks.sort_by_key(|b| b.block_seq);

        Ok(blocks)
    }

    /// Store one erasure piece, trying ranked candidates in order
    async fn transfer_piece(
        &self,
        piece: &EncodedPiece,
        assignment: PieceAssignment,
        first: bool,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoreBlock> {
        let seq = piece.meta.index;
        let upload = PieceUpload {
            hash: piece.meta.hash,
            size: piece.meta.size,
            path: piece.path.to_path_buf(),
            first,
        };

        let candidates = self.selector.rank(candidates_for(&assignment, &piece.meta.hash));
        let mut last_error = None;
        for Candidate { endpoint, grant, .. } in candidates {
            match self
                .transport
                .store_piece(&endpoint, grant, &upload, cancel)
                .await
            {
                Ok(()) => {
                    debug!(seq, kind = %piece.meta.kind, provider = %endpoint, "Piece stored");
                    metrics::record_piece_stored(piece.meta.size);
                    self.progress.advance(key, piece.meta.size);
                    return Ok(StoreBlock {
                        hash: piece.meta.hash.to_vec(),
                        size: piece.meta.size,
                        block_seq: seq,
                        is_data_shard: piece.meta.kind.is_data(),
                        store_node_id: vec![endpoint.node_id],
                    });
                }
                Err(CumulusError::Cancelled) => return Err(CumulusError::Cancelled),
                Err(e) => {
                    warn!(seq, provider = %endpoint, error = %e, "Piece transfer failed");
                    metrics::record_piece_failure(StrategyKind::Erasure.as_str());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CumulusError::UnexpectedResponse(format!("no provider assigned for piece {}", seq))
        }))
    }

    /// Send the whole file to every replica target; tolerate partial failure
    #[instrument(skip_all, fields(file_hash = %file.digest.hash, replicas = providers.len()))]
    async fn upload_replicas(
        &self,
        identity: &NodeIdentity,
        file: &FileDescriptor,
        providers: Vec<ReplicaTarget>,
        key: &str,
        cancel: &CancellationToken,
        state: &mut UploadState,
    ) -> Result<(UploadResult, usize)> {
        if providers.is_empty() {
            return Err(CumulusError::UnexpectedResponse(
                "multi-replica strategy without providers".to_string(),
            ));
        }

        Self::enter(state, UploadState::Transferring, cancel)?;
        let size = file.digest.size;
        let _progress = self.progress.track(key, size * providers.len() as u64);
        let upload = PieceUpload {
            hash: file.digest.hash,
            size,
            path: file.path.clone(),
            first: true,
        };

        let results: Vec<(ProviderEndpoint, Result<()>)> = stream::iter(providers)
            .map(|target| {
                let upload = &upload;
                async move {
                    let ReplicaTarget { endpoint, grant } = target;
                    let res = self
                        .transport
                        .store_piece(&endpoint, grant, upload, cancel)
                        .await;
                    (endpoint, res)
                }
            })
            .buffer_unordered(self.settings.parallel_pieces.max(1))
            .collect()
            .await;

        let mut stored_on = Vec::new();
        let mut failures = 0;
        let mut last_error = None;
        for (endpoint, res) in results {
            match res {
                Ok(()) => {
                    debug!(provider = %endpoint, "Replica stored");
                    metrics::record_piece_stored(size);
                    self.progress.advance(key, size);
                    stored_on.push(endpoint.node_id);
                }
                Err(CumulusError::Cancelled) => return Err(CumulusError::Cancelled),
                Err(e) => {
                    warn!(provider = %endpoint, error = %e, "Replica transfer failed, skipping");
                    metrics::record_piece_failure(StrategyKind::Replica.as_str());
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if stored_on.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                CumulusError::Internal("no replica stored".to_string())
            }));
        }

        Self::enter(state, UploadState::Finalizing, cancel)?;
        let replicas = stored_on.len();
        let partition = StorePartition {
            block: vec![StoreBlock {
                hash: file.digest.hash.to_vec(),
                size,
                block_seq: 0,
                is_data_shard: true,
                store_node_id: stored_on,
            }],
            size,
        };
        self.finalize(identity, file, vec![partition], FileStoreType::MultiReplica)
            .await?;
        self.progress.finish(key);

        Ok((
            UploadResult::Stored {
                strategy: StrategyKind::Replica,
                partitions: 1,
                pieces: replicas,
            },
            failures,
        ))
    }

    #[instrument(skip_all, fields(file_hash = %file.digest.hash, partitions = partitions.len()))]
    async fn finalize(
        &self,
        identity: &NodeIdentity,
        file: &FileDescriptor,
        partitions: Vec<StorePartition>,
        store_type: FileStoreType,
    ) -> Result<()> {
        let req = UploadFileDoneReq {
            version: PROTOCOL_VERSION,
            node_id: identity.node_id().to_vec(),
            timestamp: unix_now(),
            parent: Some(FilePath::new(file.parent.clone())),
            file_hash: file.digest.hash.to_vec(),
            file_size: file.digest.size,
            file_name: file.name.clone(),
            file_mod_time: file.mod_time,
            partition: partitions,
            interactive: file.interactive,
            new_version: file.new_version,
            store_type: store_type as i32,
            sign: Vec::new(),
        };
        ensure_ok(
            self.tracker
                .upload_file_done(sign_request(identity, req))
                .await?,
        )?;
        Ok(())
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }
}

/// Candidates for one piece, each carrying the grant issued for its hash
fn candidates_for(assignment: &PieceAssignment, hash: &ContentHash) -> Vec<Candidate> {
    assignment
        .provider_auth
        .iter()
        .filter_map(|provider| {
            let auth = provider
                .hash_auth
                .iter()
                .find(|a| a.hash.as_slice() == hash.as_bytes())
                .or_else(|| provider.hash_auth.first())?;
            Some(Candidate {
                endpoint: ProviderEndpoint::new(
                    provider.node_id.clone(),
                    provider.server.clone(),
                    provider.port,
                ),
                grant: TransferGrant::new(auth.auth.clone(), auth.ticket.clone(), auth.time),
                spare: provider.spare,
            })
        })
        .collect()
}
