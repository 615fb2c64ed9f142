//! In-memory tracker and providers for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use cumulus_client::provider::{PieceUpload, ProviderEndpoint, ProviderTransport, TransferGrant};
use cumulus_client::tracker::Tracker;
use cumulus_client::{ClientConfig, DownloadSettings, Downloader, UploadSettings, Uploader};
use cumulus_core::{ContentHash, CumulusError, ErasureConfig, NodeIdentity, Result, ScratchDir};
use cumulus_protocol::tracker::*;
use cumulus_protocol::Signable;
use ed25519_dalek::VerifyingKey;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NUM_PROVIDERS: u32 = 8;

pub fn provider_addr(i: u32) -> (Vec<u8>, String, u32) {
    (vec![0xa0 + i as u8; 4], format!("10.0.0.{}", i + 1), 6000 + i)
}

/// How the fake tracker wants new files stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Erasure { data: u32, parity: u32 },
    Replica { copies: u32 },
}

#[derive(Debug, Default)]
pub struct TrackerLog {
    pub check: usize,
    pub prepare: usize,
    pub done: usize,
    pub retrieve: usize,
    pub last_check: Option<CheckFileExistReq>,
    pub last_done: Option<UploadFileDoneReq>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    size: u64,
    inline: Vec<u8>,
    done: Option<UploadFileDoneReq>,
    data: u32,
    parity: u32,
}

struct TrackerState {
    mode: Mode,
    files: HashMap<Vec<u8>, StoredFile>,
    folders: HashMap<String, Vec<FileOrFolder>>,
    log: TrackerLog,
    /// Drop `size` from retrieval partitions to exercise the local fallback
    omit_partition_size: bool,
    /// List every retrieval block twice
    duplicate_blocks: bool,
}

pub struct MockTracker {
    key: VerifyingKey,
    state: Mutex<TrackerState>,
}

fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

impl MockTracker {
    pub fn new(identity: &NodeIdentity, mode: Mode) -> Arc<Self> {
        let mut folders = HashMap::new();
        folders.insert("/".to_string(), Vec::new());
        Arc::new(Self {
            key: identity.verifying_key(),
            state: Mutex::new(TrackerState {
                mode,
                files: HashMap::new(),
                folders,
                log: TrackerLog::default(),
                omit_partition_size: false,
                duplicate_blocks: false,
            }),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        self.state.lock().mode = mode;
    }

    pub fn omit_partition_size(&self) {
        self.state.lock().omit_partition_size = true;
    }

    pub fn duplicate_blocks(&self) {
        self.state.lock().duplicate_blocks = true;
    }

    /// Pretend `hash` was uploaded earlier by someone else
    pub fn preload(&self, hash: ContentHash, size: u64) {
        self.state.lock().files.insert(
            hash.to_vec(),
            StoredFile {
                size,
                inline: Vec::new(),
                done: None,
                data: 0,
                parity: 0,
            },
        );
    }

    pub fn log<T>(&self, f: impl FnOnce(&TrackerLog) -> T) -> T {
        f(&self.state.lock().log)
    }

    pub fn folder_names(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .folders
            .get(path)
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Add a raw listing entry, bypassing the folder checks
    pub fn list_entry(&self, parent: &str, entry: FileOrFolder) {
        Self::add_entry(&mut self.state.lock(), parent, entry);
    }

    fn check_sign<R: Signable>(&self, req: &R) -> Result<()> {
        NodeIdentity::verify(&self.key, &req.signing_bytes(), req.signature())
    }

    fn add_entry(state: &mut TrackerState, parent: &str, entry: FileOrFolder) {
        let entries = state.folders.entry(parent.to_string()).or_default();
        entries.retain(|e| e.name != entry.name);
        entries.push(entry);
    }
}

fn node(i: u32) -> RetrieveNode {
    let (node_id, server, port) = provider_addr(i);
    RetrieveNode {
        node_id,
        server,
        port,
        auth: vec![1, 2, 3],
        ticket: format!("rt-{}", i),
        time: 0,
    }
}

fn provider_index(node_id: &[u8]) -> u32 {
    (node_id[0] - 0xa0) as u32
}

#[async_trait]
impl Tracker for MockTracker {
    async fn check_file_exist(&self, req: CheckFileExistReq) -> Result<CheckFileExistResp> {
        self.check_sign(&req)?;
        let mut state = self.state.lock();
        state.log.check += 1;
        state.log.last_check = Some(req.clone());

        let exist = state.files.contains_key(&req.file_hash);
        if !exist && !req.file_data.is_empty() {
            state.files.insert(
                req.file_hash.clone(),
                StoredFile {
                    size: req.file_size,
                    inline: req.file_data.clone(),
                    done: None,
                    data: 0,
                    parity: 0,
                },
            );
            let parent = req.parent.as_ref().map(|p| p.path.clone()).unwrap_or_default();
            Self::add_entry(
                &mut state,
                &parent,
                FileOrFolder {
                    id: req.file_hash.clone(),
                    folder: false,
                    name: req.file_name.clone(),
                    mod_time: req.file_mod_time,
                    file_hash: req.file_hash.clone(),
                    file_size: req.file_size,
                },
            );
        }

        let mut resp = CheckFileExistResp {
            exist,
            ..Default::default()
        };
        match state.mode {
            Mode::Erasure { data, parity } => {
                resp.store_type = FileStoreType::ErasureCode as i32;
                resp.data_piece_count = data;
                resp.verify_piece_count = parity;
            }
            Mode::Replica { copies } => {
                resp.store_type = FileStoreType::MultiReplica as i32;
                resp.provider = (0..copies)
                    .map(|i| {
                        let (node_id, server, port) = provider_addr(i);
                        ReplicaProvider {
                            node_id,
                            server,
                            port,
                            auth: vec![9],
                            ticket: format!("replica-{}", i),
                            time: 0,
                        }
                    })
                    .collect();
            }
        }
        Ok(resp)
    }

    async fn upload_file_prepare(&self, req: UploadFilePrepareReq) -> Result<UploadFilePrepareResp> {
        self.check_sign(&req)?;
        let mut state = self.state.lock();
        state.log.prepare += 1;

        let mut next = 0u32;
        let partition = req
            .partition
            .iter()
            .map(|p| ErasureCodePartition {
                piece: p
                    .piece
                    .iter()
                    .map(|piece| {
                        let (node_id, server, port) = provider_addr(next % NUM_PROVIDERS);
                        next += 1;
                        PieceAssignment {
                            provider_auth: vec![BlockProviderAuth {
                                node_id,
                                server,
                                port,
                                spare: false,
                                hash_auth: vec![PieceHashAuth {
                                    hash: piece.hash.clone(),
                                    auth: vec![7; 8],
                                    ticket: format!("ticket-{}", next),
                                    time: 0,
                                }],
                            }],
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(UploadFilePrepareResp {
            partition,
            ..Default::default()
        })
    }

    async fn upload_file_done(&self, req: UploadFileDoneReq) -> Result<UploadFileDoneResp> {
        self.check_sign(&req)?;
        let mut state = self.state.lock();
        state.log.done += 1;
        state.log.last_done = Some(req.clone());

        let (data, parity) = match state.mode {
            Mode::Erasure { data, parity } => (data, parity),
            Mode::Replica { .. } => (0, 0),
        };
        state.files.insert(
            req.file_hash.clone(),
            StoredFile {
                size: req.file_size,
                inline: Vec::new(),
                done: Some(req.clone()),
                data,
                parity,
            },
        );
        let parent = req.parent.as_ref().map(|p| p.path.clone()).unwrap_or_default();
        Self::add_entry(
            &mut state,
            &parent,
            FileOrFolder {
                id: req.file_hash.clone(),
                folder: false,
                name: req.file_name.clone(),
                mod_time: req.file_mod_time,
                file_hash: req.file_hash.clone(),
                file_size: req.file_size,
            },
        );
        Ok(UploadFileDoneResp::default())
    }

    async fn retrieve_file(&self, req: RetrieveFileReq) -> Result<RetrieveFileResp> {
        self.check_sign(&req)?;
        let mut state = self.state.lock();
        state.log.retrieve += 1;

        let Some(file) = state.files.get(&req.file_hash).cloned() else {
            return Ok(RetrieveFileResp {
                code: 404,
                err_msg: "file not found".into(),
                ..Default::default()
            });
        };
        if !file.inline.is_empty() || file.size == 0 {
            return Ok(RetrieveFileResp {
                file_data: file.inline,
                ..Default::default()
            });
        }

        let done = file.done.unwrap_or_default();
        let omit = state.omit_partition_size;
        let copies = if state.duplicate_blocks { 2 } else { 1 };
        let partition = done
            .partition
            .iter()
            .map(|p| RetrievePartition {
                block: p
                    .block
                    .iter()
                    .flat_map(|b| {
                        let block = RetrieveBlock {
                            hash: b.hash.clone(),
                            size: b.size,
                            block_seq: b.block_seq,
                            is_data_shard: b.is_data_shard,
                            store_node: b.store_node_id.iter().map(|id| node(provider_index(id))).collect(),
                        };
                        std::iter::repeat(block).take(copies)
                    })
                    .collect(),
                size: if omit { 0 } else { p.size },
            })
            .collect();

        Ok(RetrieveFileResp {
            partition,
            data_piece_count: file.data,
            verify_piece_count: file.parity,
            ..Default::default()
        })
    }

    async fn list_files(&self, req: ListFilesReq) -> Result<ListFilesResp> {
        self.check_sign(&req)?;
        let state = self.state.lock();
        let path = req.parent.map(|p| p.path).unwrap_or_default();
        let Some(entries) = state.folders.get(&path) else {
            return Ok(ListFilesResp {
                code: 2,
                err_msg: format!("no such folder: {}", path),
                ..Default::default()
            });
        };

        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        if !req.asc_order {
            sorted.reverse();
        }
        let page_size = req.page_size.max(1) as usize;
        let start = (req.page_num.max(1) as usize - 1) * page_size;
        let fof = sorted.into_iter().skip(start).take(page_size).collect();

        Ok(ListFilesResp {
            total: entries.len() as u32,
            fof,
            ..Default::default()
        })
    }

    async fn mk_folder(&self, req: MkFolderReq) -> Result<MkFolderResp> {
        self.check_sign(&req)?;
        let mut state = self.state.lock();
        let parent = req.parent.map(|p| p.path).unwrap_or_default();
        if !state.folders.contains_key(&parent) {
            return Ok(MkFolderResp {
                code: 2,
                err_msg: format!("no such folder: {}", parent),
            });
        }
        for name in req.folder {
            let path = join(&parent, &name);
            state.folders.entry(path.clone()).or_default();
            Self::add_entry(
                &mut state,
                &parent,
                FileOrFolder {
                    id: path.into_bytes(),
                    folder: true,
                    name,
                    ..Default::default()
                },
            );
        }
        Ok(MkFolderResp::default())
    }

    async fn remove_file(&self, req: RemoveFileReq) -> Result<RemoveFileResp> {
        self.check_sign(&req)?;
        let mut state = self.state.lock();
        let target = req.target.map(|t| t.path).unwrap_or_default();
        if state.folders.get(&target).is_some_and(|e| !e.is_empty()) && !req.recursive {
            return Ok(RemoveFileResp {
                code: 39,
                err_msg: "folder not empty".into(),
            });
        }
        state.folders.retain(|path, _| path != &target && !path.starts_with(&format!("{}/", target)));
        let (parent, name) = target.rsplit_once('/').unwrap_or(("", target.as_str()));
        let parent = if parent.is_empty() { "/" } else { parent };
        if let Some(entries) = state.folders.get_mut(parent) {
            entries.retain(|e| e.name != name);
        }
        Ok(RemoveFileResp::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub address: String,
    pub key: Vec<u8>,
    pub first: bool,
}

#[derive(Default)]
struct ProviderState {
    pieces: HashMap<String, HashMap<Vec<u8>, Vec<u8>>>,
    failing: HashSet<String>,
    stores: Vec<StoreCall>,
    retrievals: Vec<String>,
    hang: bool,
}

/// Every provider of the test network in one place
#[derive(Default)]
pub struct MockProviders {
    state: Mutex<ProviderState>,
}

impl MockProviders {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, provider: u32) {
        let (_, server, port) = provider_addr(provider);
        self.state.lock().failing.insert(format!("{}:{}", server, port));
    }

    /// Make every transfer wait until it is cancelled
    pub fn hang(&self) {
        self.state.lock().hang = true;
    }

    pub fn stores(&self) -> Vec<StoreCall> {
        self.state.lock().stores.clone()
    }

    pub fn retrievals(&self) -> usize {
        self.state.lock().retrievals.len()
    }

    pub fn piece_count(&self) -> usize {
        self.state.lock().pieces.values().map(|p| p.len()).sum()
    }

    pub fn holders(&self, key: &[u8]) -> usize {
        self.state
            .lock()
            .pieces
            .values()
            .filter(|p| p.contains_key(key))
            .count()
    }

    /// Flip one byte of a stored piece wherever it is held
    pub fn corrupt(&self, key: &[u8]) {
        for pieces in self.state.lock().pieces.values_mut() {
            if let Some(bytes) = pieces.get_mut(key) {
                bytes[0] ^= 0xff;
            }
        }
    }

    /// Forget a stored piece everywhere
    pub fn lose(&self, key: &[u8]) {
        for pieces in self.state.lock().pieces.values_mut() {
            pieces.remove(key);
        }
    }
}

#[async_trait]
impl ProviderTransport for MockProviders {
    async fn store_piece(
        &self,
        endpoint: &ProviderEndpoint,
        grant: TransferGrant,
        piece: &PieceUpload,
        cancel: &CancellationToken,
    ) -> Result<()> {
        grant.validate(endpoint)?;
        if self.state.lock().hang {
            cancel.cancelled().await;
            return Err(CumulusError::Cancelled);
        }

        let address = endpoint.address();
        let data = tokio::fs::read(&piece.path).await?;
        let mut state = self.state.lock();
        state.stores.push(StoreCall {
            address: address.clone(),
            key: piece.hash.to_vec(),
            first: piece.first,
        });
        if state.failing.contains(&address) {
            return Err(CumulusError::transport(address, "connection refused"));
        }
        assert_eq!(data.len() as u64, piece.size);
        assert!(piece.hash.verify(&data));
        state
            .pieces
            .entry(address)
            .or_default()
            .insert(piece.hash.to_vec(), data);
        Ok(())
    }

    async fn retrieve_piece(
        &self,
        endpoint: &ProviderEndpoint,
        grant: TransferGrant,
        hash: &ContentHash,
        dest: &Path,
        _cancel: &CancellationToken,
    ) -> Result<u64> {
        grant.validate(endpoint)?;
        let address = endpoint.address();
        let data = {
            let mut state = self.state.lock();
            state.retrievals.push(address.clone());
            if state.failing.contains(&address) {
                return Err(CumulusError::transport(address, "connection refused"));
            }
            state
                .pieces
                .get(&address)
                .and_then(|p| p.get(hash.as_bytes().as_slice()))
                .cloned()
                .ok_or_else(|| CumulusError::Protocol {
                    code: 404,
                    message: format!("piece {} not held", hash),
                })?
        };
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }
}

/// Everything a test needs: identity, fakes, orchestrators, temp dirs
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub identity: NodeIdentity,
    pub tracker: Arc<MockTracker>,
    pub providers: Arc<MockProviders>,
    pub scratch: ScratchDir,
    pub uploader: Uploader,
    pub downloader: Downloader,
}

impl Harness {
    pub fn new(mode: Mode) -> Self {
        Self::with_partition_size(mode, 1024 * 1024)
    }

    pub fn with_partition_size(mode: Mode, partition_size: u64) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let identity = NodeIdentity::generate();
        let tracker = MockTracker::new(&identity, mode);
        let providers = MockProviders::new();
        let scratch = ScratchDir::new(dir.path().join("scratch")).unwrap();

        let uploader = Uploader::new(
            tracker.clone(),
            providers.clone(),
            scratch.clone(),
            UploadSettings {
                partition_size,
                inline_threshold: 8192,
                erasure: ErasureConfig::default(),
                parallel_pieces: 3,
            },
        );
        let downloader = Downloader::new(
            tracker.clone(),
            providers.clone(),
            scratch.clone(),
            DownloadSettings {
                partition_size,
                erasure: ErasureConfig::default(),
            },
        );

        Self {
            dir,
            identity,
            tracker,
            providers,
            scratch,
            uploader,
            downloader,
        }
    }

    /// Write `data` to a file named `name` inside the harness dir
    pub fn file(&self, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.storage.scratch_dir = self.dir.path().join("client-scratch");
        config
    }
}

/// Deterministic pseudo-random bytes
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}
