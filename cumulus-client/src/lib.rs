//! Cumulus Client Library
//!
//! Moves files between local disk and a Cumulus storage network:
//! - Existence checks and deduplication against the tracker
//! - Erasure-coded or replicated uploads to storage providers
//! - Verified downloads with reconstruction from surviving pieces
//! - Folder listing, creation and removal
//!
//! [`Client`] wires the pieces together from a [`ClientConfig`]; the
//! orchestrators can also be built directly over any [`Tracker`] and
//! [`ProviderTransport`].

pub mod catalog;
pub mod config;
pub mod download;
pub mod existence;
pub mod metrics;
pub mod progress;
pub mod provider;
pub mod sign;
pub mod tracker;
pub mod upload;

pub use catalog::{Catalog, CatalogEntry, DirSummary, ListPage, ListQuery, SortKey};
pub use config::{ClientConfig, ConfigError};
pub use download::{DownloadReport, DownloadRequest, DownloadSettings, DownloadSource, Downloader};
pub use existence::{check_exists, ExistenceOutcome, FileDescriptor, StorageStrategy};
pub use progress::{Progress, ProgressGuard, ProgressRegistry};
pub use provider::{
    Candidate, FirstCandidate, GrpcProviderTransport, PieceUpload, PrimaryThenSpare,
    ProviderEndpoint, ProviderSelector, ProviderTransport, TransferGrant, TransferSettings,
};
pub use tracker::{GrpcTracker, Tracker, TrackerSettings};
pub use upload::{
    StrategyKind, UploadReport, UploadRequest, UploadResult, UploadSettings, UploadState, Uploader,
};

use cumulus_core::{NodeIdentity, Result, ScratchDir};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Uploads, downloads and catalog operations for one node identity
pub struct Client {
    identity: NodeIdentity,
    uploader: Uploader,
    downloader: Downloader,
    catalog: Catalog,
    progress: ProgressRegistry,
}

impl Client {
    /// Load the node key and connect to the configured tracker
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let identity = config.load_identity()?;
        let tracker: Arc<dyn Tracker> = Arc::new(GrpcTracker::connect(&config.tracker_settings()).await?);
        let transport: Arc<dyn ProviderTransport> =
            Arc::new(GrpcProviderTransport::new(config.transfer_settings()));
        Self::from_parts(config, identity, tracker, transport)
    }

    /// Build over caller-supplied tracker and transport
    pub fn from_parts(
        config: &ClientConfig,
        identity: NodeIdentity,
        tracker: Arc<dyn Tracker>,
        transport: Arc<dyn ProviderTransport>,
    ) -> Result<Self> {
        let scratch = ScratchDir::new(config.scratch_dir())?;
        let progress = ProgressRegistry::new();

        let uploader = Uploader::new(
            tracker.clone(),
            transport.clone(),
            scratch.clone(),
            config.upload_settings()?,
        )
        .with_progress(progress.clone());
        let downloader = Downloader::new(
            tracker.clone(),
            transport,
            scratch,
            config.download_settings()?,
        )
        .with_progress(progress.clone());

        Ok(Self {
            identity,
            uploader,
            downloader,
            catalog: Catalog::new(tracker),
            progress,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn upload(&self, request: UploadRequest, cancel: &CancellationToken) -> Result<UploadReport> {
        self.uploader.upload(&self.identity, request, cancel).await
    }

    pub async fn download(
        &self,
        request: DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        self.downloader.download(&self.identity, request, cancel).await
    }

    pub async fn upload_dir(
        &self,
        local_dir: &Path,
        remote_parent: &str,
        new_version: bool,
        cancel: &CancellationToken,
    ) -> Result<DirSummary> {
        catalog::upload_dir(
            &self.catalog,
            &self.uploader,
            &self.identity,
            local_dir,
            remote_parent,
            new_version,
            cancel,
        )
        .await
    }

    pub async fn download_dir(
        &self,
        remote_parent: &str,
        local_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<DirSummary> {
        catalog::download_dir(
            &self.catalog,
            &self.downloader,
            &self.identity,
            remote_parent,
            local_dir,
            cancel,
        )
        .await
    }

    pub async fn list_files(&self, query: &ListQuery) -> Result<ListPage> {
        self.catalog.list_files(&self.identity, query).await
    }

    pub async fn mk_folder(&self, parent: &str, folders: &[String]) -> Result<()> {
        self.catalog.mk_folder(&self.identity, parent, folders).await
    }

    pub async fn remove(&self, target: &str, recursive: bool) -> Result<()> {
        self.catalog.remove(&self.identity, target, recursive).await
    }
}
