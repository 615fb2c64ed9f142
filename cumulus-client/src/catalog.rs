//! Remote catalog: folders, listings, removal, and whole-directory transfers

use crate::download::{DownloadRequest, Downloader};
use crate::sign::{sign_request, unix_now};
use crate::tracker::{ensure_ok, Tracker};
use crate::upload::{UploadRequest, Uploader};
use cumulus_core::{ContentHash, CumulusError, NodeIdentity, Result};
use cumulus_protocol::tracker::{FilePath, ListFilesReq, MkFolderReq, RemoveFileReq, SortType};
use cumulus_protocol::PROTOCOL_VERSION;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Size,
    ModTime,
}

impl SortKey {
    fn to_wire(self) -> SortType {
        match self {
            SortKey::Name => SortType::Name,
            SortKey::Size => SortType::Size,
            SortKey::ModTime => SortType::ModTime,
        }
    }
}

impl FromStr for SortKey {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "size" => Ok(SortKey::Size),
            "modtime" | "mod_time" | "mtime" => Ok(SortKey::ModTime),
            other => Err(CumulusError::Configuration(format!(
                "unknown sort key: {}",
                other
            ))),
        }
    }
}

/// One page request; pages are numbered from 1
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub path: String,
    pub page_size: u32,
    pub page_num: u32,
    pub sort: SortKey,
    pub ascending: bool,
}

impl ListQuery {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            page_size: 100,
            page_num: 1,
            sort: SortKey::Name,
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: Vec<u8>,
    pub name: String,
    pub is_folder: bool,
    /// Unix seconds
    pub mod_time: u64,
    /// `None` for folders
    pub file_hash: Option<ContentHash>,
    pub file_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries in the folder across all pages
    pub total: u32,
    pub entries: Vec<CatalogEntry>,
}

/// Per-file outcome of a directory transfer
#[derive(Debug, Default)]
pub struct DirSummary {
    pub succeeded: usize,
    pub folders: usize,
    pub failed: Vec<(String, CumulusError)>,
}

impl DirSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Join a remote folder and a child name
pub fn join_remote(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Local path for a listed entry; the name must be a single plain component
fn local_child(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(dir.join(part)),
        _ => Err(CumulusError::UnexpectedResponse(format!(
            "refusing listed entry name {:?}",
            name
        ))),
    }
}

/// Folder and listing operations against the tracker
#[derive(Clone)]
pub struct Catalog {
    tracker: Arc<dyn Tracker>,
}

impl Catalog {
    pub fn new(tracker: Arc<dyn Tracker>) -> Self {
        Self { tracker }
    }

    /// Create `folders` under `parent`
    #[instrument(skip(self, identity))]
    pub async fn mk_folder(
        &self,
        identity: &NodeIdentity,
        parent: &str,
        folders: &[String],
    ) -> Result<()> {
        let req = MkFolderReq {
            version: PROTOCOL_VERSION,
            node_id: identity.node_id().to_vec(),
            timestamp: unix_now(),
            parent: Some(FilePath::new(parent)),
            folder: folders.to_vec(),
            interactive: false,
            sign: Vec::new(),
        };
        ensure_ok(self.tracker.mk_folder(sign_request(identity, req)).await?)?;
        Ok(())
    }

    #[instrument(skip(self, identity))]
    pub async fn list_files(&self, identity: &NodeIdentity, query: &ListQuery) -> Result<ListPage> {
        let req = ListFilesReq {
            version: PROTOCOL_VERSION,
            node_id: identity.node_id().to_vec(),
            timestamp: unix_now(),
            parent: Some(FilePath::new(query.path.clone())),
            page_size: query.page_size,
            page_num: query.page_num,
            sort_type: query.sort.to_wire() as i32,
            asc_order: query.ascending,
            sign: Vec::new(),
        };
        let resp = ensure_ok(self.tracker.list_files(sign_request(identity, req)).await?)?;

        let entries = resp
            .fof
            .into_iter()
            .map(|entry| {
                let file_hash = if entry.folder {
                    None
                } else {
                    Some(ContentHash::from_slice(&entry.file_hash)?)
                };
                Ok(CatalogEntry {
                    id: entry.id,
                    name: entry.name,
                    is_folder: entry.folder,
                    mod_time: entry.mod_time,
                    file_hash,
                    file_size: entry.file_size,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ListPage {
            total: resp.total,
            entries,
        })
    }

    #[instrument(skip(self, identity))]
    pub async fn remove(&self, identity: &NodeIdentity, target: &str, recursive: bool) -> Result<()> {
        let req = RemoveFileReq {
            version: PROTOCOL_VERSION,
            node_id: identity.node_id().to_vec(),
            timestamp: unix_now(),
            target: Some(FilePath::new(target)),
            recursive,
            sign: Vec::new(),
        };
        ensure_ok(self.tracker.remove_file(sign_request(identity, req)).await?)?;
        Ok(())
    }

    /// Every entry of a remote folder, following pages until `total` is reached
    pub async fn list_all(&self, identity: &NodeIdentity, path: &str) -> Result<Vec<CatalogEntry>> {
        let mut query = ListQuery::new(path);
        let mut entries = Vec::new();
        loop {
            let page = self.list_files(identity, &query).await?;
            let got = page.entries.len();
            entries.extend(page.entries);
            if got == 0 || entries.len() >= page.total as usize {
                break;
            }
            query.page_num += 1;
        }
        Ok(entries)
    }
}

/// Upload a local directory tree under `remote_parent`.
///
/// Each remote folder is created before its contents. A failed file is
/// recorded and the walk continues.
#[instrument(skip_all, fields(local = %local_dir.display(), remote = remote_parent))]
pub async fn upload_dir(
    catalog: &Catalog,
    uploader: &Uploader,
    identity: &NodeIdentity,
    local_dir: &Path,
    remote_parent: &str,
    new_version: bool,
    cancel: &CancellationToken,
) -> Result<DirSummary> {
    let mut summary = DirSummary::default();
    let mut pending: Vec<(PathBuf, String)> = vec![(local_dir.to_path_buf(), remote_parent.to_string())];

    if let Some(name) = local_dir.file_name() {
        let name = name.to_string_lossy().into_owned();
        catalog
            .mk_folder(identity, remote_parent, &[name.clone()])
            .await?;
        summary.folders += 1;
        pending[0].1 = join_remote(remote_parent, &name);
    }

    while let Some((dir, remote)) = pending.pop() {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if cancel.is_cancelled() {
                return Err(CumulusError::Cancelled);
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if entry.file_type().await?.is_dir() {
                match catalog.mk_folder(identity, &remote, &[name.clone()]).await {
                    Ok(()) => {
                        summary.folders += 1;
                        pending.push((path, join_remote(&remote, &name)));
                    }
                    Err(e) => {
                        warn!(folder = %path.display(), error = %e, "Folder creation failed, skipping subtree");
                        summary.failed.push((path.display().to_string(), e));
                    }
                }
                continue;
            }

            let request = UploadRequest::new(&path, remote.clone()).new_version(new_version);
            match uploader.upload(identity, request, cancel).await {
                Ok(report) => {
                    debug!(file = %path.display(), result = ?report.result, "File uploaded");
                    summary.succeeded += 1;
                }
                Err(CumulusError::Cancelled) => return Err(CumulusError::Cancelled),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "File upload failed, continuing");
                    summary.failed.push((path.display().to_string(), e));
                }
            }
        }
    }

    info!(
        files = summary.succeeded,
        folders = summary.folders,
        failed = summary.failed.len(),
        "Directory upload finished"
    );
    Ok(summary)
}

/// Download a remote folder tree into `local_dir`
#[instrument(skip_all, fields(remote = remote_parent, local = %local_dir.display()))]
pub async fn download_dir(
    catalog: &Catalog,
    downloader: &Downloader,
    identity: &NodeIdentity,
    remote_parent: &str,
    local_dir: &Path,
    cancel: &CancellationToken,
) -> Result<DirSummary> {
    let mut summary = DirSummary::default();
    let mut pending = vec![(remote_parent.to_string(), local_dir.to_path_buf())];

    while let Some((remote, dir)) = pending.pop() {
        tokio::fs::create_dir_all(&dir).await?;
        let entries = catalog.list_all(identity, &remote).await?;

        for entry in entries {
            if cancel.is_cancelled() {
                return Err(CumulusError::Cancelled);
            }
            let local = match local_child(&dir, &entry.name) {
                Ok(local) => local,
                Err(e) => {
                    warn!(remote = %remote, name = %entry.name, "Skipping entry with unsafe name");
                    summary.failed.push((join_remote(&remote, &entry.name), e));
                    continue;
                }
            };

            if entry.is_folder {
                summary.folders += 1;
                pending.push((join_remote(&remote, &entry.name), local));
                continue;
            }

            let Some(file_hash) = entry.file_hash else {
                continue;
            };
            let request = DownloadRequest {
                file_hash,
                file_size: entry.file_size,
                output: local.clone(),
            };
            match downloader.download(identity, request, cancel).await {
                Ok(_) => summary.succeeded += 1,
                Err(CumulusError::Cancelled) => return Err(CumulusError::Cancelled),
                Err(e) => {
                    warn!(file = %local.display(), error = %e, "File download failed, continuing");
                    summary.failed.push((join_remote(&remote, &entry.name), e));
                }
            }
        }
    }

    info!(
        files = summary.succeeded,
        folders = summary.folders,
        failed = summary.failed.len(),
        "Directory download finished"
    );
    Ok(summary)
}
