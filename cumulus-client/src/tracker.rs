//! Tracker access
//!
//! [`Tracker`] is the seam the orchestrators talk through. [`GrpcTracker`]
//! is the production implementation: one tonic `Channel` (HTTP/2,
//! multiplexed, cheap to clone) shared by every caller, with a per-call
//! deadline on top of the channel's own timeouts.

use async_trait::async_trait;
use cumulus_core::{CumulusError, Result};
use cumulus_protocol::tracker::*;
use cumulus_protocol::{MetadataServiceClient, CODE_OK};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, instrument};

/// Tracker RPCs, one method per remote call
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn check_file_exist(&self, req: CheckFileExistReq) -> Result<CheckFileExistResp>;

    async fn upload_file_prepare(&self, req: UploadFilePrepareReq) -> Result<UploadFilePrepareResp>;

    async fn upload_file_done(&self, req: UploadFileDoneReq) -> Result<UploadFileDoneResp>;

    async fn retrieve_file(&self, req: RetrieveFileReq) -> Result<RetrieveFileResp>;

    async fn list_files(&self, req: ListFilesReq) -> Result<ListFilesResp>;

    async fn mk_folder(&self, req: MkFolderReq) -> Result<MkFolderResp>;

    async fn remove_file(&self, req: RemoveFileReq) -> Result<RemoveFileResp>;
}

/// Turn a non-zero tracker `code` into a [`CumulusError::Protocol`]
pub fn ensure_ok<R: TrackerStatus>(resp: R) -> Result<R> {
    if resp.code() == CODE_OK {
        Ok(resp)
    } else {
        Err(CumulusError::Protocol {
            code: resp.code(),
            message: resp.err_msg().to_string(),
        })
    }
}

/// Map a gRPC status from `endpoint` onto the error kinds callers act on
pub fn status_to_error(endpoint: &str, status: tonic::Status) -> CumulusError {
    use tonic::Code;
    match status.code() {
        Code::Unavailable | Code::Cancelled | Code::Unknown | Code::Aborted => {
            CumulusError::transport(endpoint, status.message())
        }
        Code::DeadlineExceeded => CumulusError::transport(endpoint, "deadline exceeded"),
        code => CumulusError::Protocol {
            code: code as u32,
            message: status.message().to_string(),
        },
    }
}

/// Configuration for the tracker connection
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub address: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// CA certificate; TLS is used when set
    pub ca_cert: Option<PathBuf>,
    pub max_message_size: usize,
    pub keep_alive_interval: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:7788".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            ca_cert: None,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            keep_alive_interval: Duration::from_secs(60),
        }
    }
}

/// Tracker client over gRPC
#[derive(Debug, Clone)]
pub struct GrpcTracker {
    client: MetadataServiceClient,
    address: String,
    request_timeout: Duration,
}

impl GrpcTracker {
    /// Connect eagerly, failing fast when the tracker is unreachable
    pub async fn connect(settings: &TrackerSettings) -> Result<Self> {
        let channel = Self::endpoint(settings)?
            .connect()
            .await
            .map_err(|e| {
                CumulusError::transport(&settings.address, format!("connection failed: {}", e))
            })?;
        info!(addr = %settings.address, tls = settings.ca_cert.is_some(), "Tracker connection established");
        Ok(Self::from_channel(channel, settings))
    }

    /// Build the client without dialing; the first call connects
    pub fn connect_lazy(settings: &TrackerSettings) -> Result<Self> {
        let channel = Self::endpoint(settings)?.connect_lazy();
        Ok(Self::from_channel(channel, settings))
    }

    fn from_channel(channel: Channel, settings: &TrackerSettings) -> Self {
        let client = MetadataServiceClient::new(channel)
            .max_decoding_message_size(settings.max_message_size)
            .max_encoding_message_size(settings.max_message_size);
        Self {
            client,
            address: settings.address.clone(),
            request_timeout: settings.request_timeout,
        }
    }

    fn endpoint(settings: &TrackerSettings) -> Result<Endpoint> {
        let mut endpoint = Channel::from_shared(settings.address.clone())
            .map_err(|e| {
                CumulusError::Configuration(format!(
                    "invalid tracker address {}: {}",
                    settings.address, e
                ))
            })?
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .http2_keep_alive_interval(settings.keep_alive_interval)
            .keep_alive_timeout(Duration::from_secs(20));

        if let Some(ca_cert) = &settings.ca_cert {
            endpoint = endpoint.tls_config(tls_config(ca_cert)?).map_err(|e| {
                CumulusError::Configuration(format!("failed to configure TLS: {}", e))
            })?;
            debug!(addr = %settings.address, "TLS configured for tracker connection");
        }

        Ok(endpoint)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call<T, F, Fut>(&self, rpc: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(MetadataServiceClient) -> Fut,
        Fut: Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    {
        match tokio::time::timeout(self.request_timeout, f(self.client.clone())).await {
            Ok(Ok(resp)) => Ok(resp.into_inner()),
            Ok(Err(status)) => {
                debug!(rpc, code = ?status.code(), "Tracker call failed");
                Err(status_to_error(&self.address, status))
            }
            Err(_) => Err(CumulusError::Timeout {
                endpoint: self.address.clone(),
                secs: self.request_timeout.as_secs(),
            }),
        }
    }
}

fn tls_config(ca_cert: &std::path::Path) -> Result<ClientTlsConfig> {
    let pem = std::fs::read(ca_cert).map_err(|e| {
        CumulusError::Configuration(format!(
            "cannot read CA certificate {}: {}",
            ca_cert.display(),
            e
        ))
    })?;
    Ok(ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)))
}

#[async_trait]
impl Tracker for GrpcTracker {
    #[instrument(skip_all, fields(file_size = req.file_size))]
    async fn check_file_exist(&self, req: CheckFileExistReq) -> Result<CheckFileExistResp> {
        self.call("CheckFileExist", |mut c| async move { c.check_file_exist(req).await })
            .await
    }

    #[instrument(skip_all, fields(partitions = req.partition.len()))]
    async fn upload_file_prepare(&self, req: UploadFilePrepareReq) -> Result<UploadFilePrepareResp> {
        self.call("UploadFilePrepare", |mut c| async move {
            c.upload_file_prepare(req).await
        })
        .await
    }

    #[instrument(skip_all, fields(partitions = req.partition.len()))]
    async fn upload_file_done(&self, req: UploadFileDoneReq) -> Result<UploadFileDoneResp> {
        self.call("UploadFileDone", |mut c| async move { c.upload_file_done(req).await })
            .await
    }

    #[instrument(skip_all, fields(file_size = req.file_size))]
    async fn retrieve_file(&self, req: RetrieveFileReq) -> Result<RetrieveFileResp> {
        self.call("RetrieveFile", |mut c| async move { c.retrieve_file(req).await })
            .await
    }

    #[instrument(skip_all)]
    async fn list_files(&self, req: ListFilesReq) -> Result<ListFilesResp> {
        self.call("ListFiles", |mut c| async move { c.list_files(req).await })
            .await
    }

    #[instrument(skip_all)]
    async fn mk_folder(&self, req: MkFolderReq) -> Result<MkFolderResp> {
        self.call("MkFolder", |mut c| async move { c.mk_folder(req).await })
            .await
    }

    #[instrument(skip_all, fields(recursive = req.recursive))]
    async fn remove_file(&self, req: RemoveFileReq) -> Result<RemoveFileResp> {
        self.call("RemoveFile", |mut c| async move { c.remove_file(req).await })
            .await
    }
}
