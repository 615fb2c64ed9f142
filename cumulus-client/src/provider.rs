//! Provider transfers
//!
//! A provider accepts a piece only with the `(auth, ticket)` grant the
//! tracker issued for that piece. Grants are single-use, so they are moved
//! into the transfer call.

use crate::sign::unix_now;
use crate::tracker::status_to_error;
use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::{ContentHash, CumulusError, Result};
use cumulus_protocol::provider::{RetrieveReq, StoreReq};
use cumulus_protocol::{ProviderServiceClient, CODE_OK, PROTOCOL_VERSION};
use futures::StreamExt;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::{debug, instrument};

/// Where a provider listens
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderEndpoint {
    pub node_id: Vec<u8>,
    pub server: String,
    pub port: u32,
}

impl ProviderEndpoint {
    pub fn new(node_id: Vec<u8>, server: impl Into<String>, port: u32) -> Self {
        Self {
            node_id,
            server: server.into(),
            port,
        }
    }

    /// `server:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    pub fn node_id_hex(&self) -> String {
        hex::encode(&self.node_id)
    }
}

impl fmt::Display for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.port)
    }
}

/// Tracker-issued credential for one piece transfer to one provider
#[derive(PartialEq, Eq)]
pub struct TransferGrant {
    auth: Vec<u8>,
    ticket: String,
    /// Unix seconds; 0 means the tracker set no expiry
    expires_at: u64,
}

impl TransferGrant {
    pub fn new(auth: Vec<u8>, ticket: impl Into<String>, expires_at: u64) -> Self {
        Self {
            auth,
            ticket: ticket.into(),
            expires_at,
        }
    }

    pub fn ticket(&self) -> &str {
        &self.ticket
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }

    /// Reject empty or expired grants before any connection is made
    pub fn validate(self, endpoint: &ProviderEndpoint) -> Result<Self> {
        if self.auth.is_empty() || self.ticket.is_empty() || self.is_expired(unix_now()) {
            return Err(CumulusError::GrantExpired {
                provider: endpoint.to_string(),
            });
        }
        Ok(self)
    }
}

impl fmt::Debug for TransferGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferGrant")
            .field("ticket", &self.ticket)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// One piece on local disk, ready to send
#[derive(Debug, Clone)]
pub struct PieceUpload {
    pub hash: ContentHash,
    pub size: u64,
    pub path: PathBuf,
    /// First piece of a partition; the provider opens its session on it
    pub first: bool,
}

/// Authenticated piece store/retrieve against a single provider
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn store_piece(
        &self,
        endpoint: &ProviderEndpoint,
        grant: TransferGrant,
        piece: &PieceUpload,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Write the piece keyed by `hash` to `dest`, returning the byte count
    async fn retrieve_piece(
        &self,
        endpoint: &ProviderEndpoint,
        grant: TransferGrant,
        hash: &ContentHash,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// A provider the tracker offered for a piece, with its grant
#[derive(Debug)]
pub struct Candidate {
    pub endpoint: ProviderEndpoint,
    pub grant: TransferGrant,
    pub spare: bool,
}

/// Orders the candidates offered for a piece; transfers try them in order
pub trait ProviderSelector: Send + Sync {
    fn rank(&self, candidates: Vec<Candidate>) -> Vec<Candidate>;
}

/// Use only the tracker's first candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

impl ProviderSelector for FirstCandidate {
    fn rank(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.into_iter().take(1).collect()
    }
}

/// Try every candidate, primaries before spares
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryThenSpare;

impl ProviderSelector for PrimaryThenSpare {
    fn rank(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by_key(|c| c.spare);
        candidates
    }
}

/// Configuration for provider transfers
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Deadline for one whole piece transfer
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Bytes per streamed message
    pub chunk_size: usize,
    pub max_message_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            chunk_size: 1024 * 1024,
            max_message_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// Provider transport over gRPC.
///
/// Every call dials its own plaintext channel; the channel is dropped when
/// the call returns, fails, times out or is cancelled.
#[derive(Debug, Clone, Default)]
pub struct GrpcProviderTransport {
    settings: TransferSettings,
}

impl GrpcProviderTransport {
    pub fn new(settings: TransferSettings) -> Self {
        Self { settings }
    }

    async fn dial(&self, endpoint: &ProviderEndpoint) -> Result<ProviderServiceClient> {
        let address = endpoint.address();
        let channel = Channel::from_shared(format!("http://{}", address))
            .map_err(|e| CumulusError::transport(&address, format!("invalid endpoint: {}", e)))?
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.timeout)
            .connect()
            .await
            .map_err(|e| CumulusError::transport(&address, format!("connection failed: {}", e)))?;
        debug!(provider = %address, "Provider connection established");

        Ok(ProviderServiceClient::new(channel)
            .max_decoding_message_size(self.settings.max_message_size)
            .max_encoding_message_size(self.settings.max_message_size))
    }

    /// Run `fut` under the transfer deadline, giving up early on cancellation
    async fn bounded<T>(
        &self,
        endpoint: &ProviderEndpoint,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CumulusError::Cancelled),
            res = tokio::time::timeout(self.settings.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(CumulusError::Timeout {
                    endpoint: endpoint.address(),
                    secs: self.settings.timeout.as_secs(),
                }),
            },
        }
    }
}

/// Feed the piece at `path` into `tx`, the header riding on the first message
async fn send_chunks(
    path: PathBuf,
    header: StoreReq,
    chunk_size: usize,
    tx: mpsc::Sender<StoreReq>,
) -> Result<u64> {
    let file = tokio::fs::File::open(&path).await?;
    let mut chunks = ReaderStream::with_capacity(file, chunk_size);
    let mut header = Some(header);
    let mut sent = 0u64;

    while let Some(chunk) = chunks.next().await {
        let data: Bytes = chunk?;
        sent += data.len() as u64;
        let msg = match header.take() {
            Some(mut first) => {
                first.data = data;
                first
            }
            None => StoreReq {
                data,
                ..Default::default()
            },
        };
        if tx.send(msg).await.is_err() {
            // receiver dropped: the call already ended
            break;
        }
    }

    if let Some(first) = header {
        // empty piece
        let _ = tx.send(first).await;
    }

    Ok(sent)
}

#[async_trait]
impl ProviderTransport for GrpcProviderTransport {
    #[instrument(skip_all, fields(provider = %endpoint, piece = %piece.hash, size = piece.size, first = piece.first))]
    async fn store_piece(
        &self,
        endpoint: &ProviderEndpoint,
        grant: TransferGrant,
        piece: &PieceUpload,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let grant = grant.validate(endpoint)?;
        let address = endpoint.address();

        let transfer = async {
            let mut client = self.dial(endpoint).await?;
            let header = StoreReq {
                version: PROTOCOL_VERSION,
                auth: grant.auth,
                ticket: grant.ticket,
                key: piece.hash.to_vec(),
                file_size: piece.size,
                first: piece.first,
                data: Bytes::new(),
            };

            let (tx, rx) = mpsc::channel(4);
            let reader = tokio::spawn(send_chunks(
                piece.path.clone(),
                header,
                self.settings.chunk_size,
                tx,
            ));

            let response = client.store(ReceiverStream::new(rx)).await;
            let sent = reader
                .await
                .map_err(|e| CumulusError::Internal(format!("piece reader failed: {}", e)))??;
            let resp = response.map_err(|status| status_to_error(&address, status))?.into_inner();

            if resp.code != CODE_OK {
                return Err(CumulusError::Protocol {
                    code: resp.code,
                    message: resp.err_msg,
                });
            }
            if sent != piece.size {
                return Err(CumulusError::Internal(format!(
                    "piece {} changed on disk: sent {} of {} bytes",
                    piece.hash, sent, piece.size
                )));
            }

            debug!(bytes = sent, "Piece stored");
            Ok(())
        };

        self.bounded(endpoint, cancel, transfer).await
    }

    #[instrument(skip_all, fields(provider = %endpoint, piece = %hash))]
    async fn retrieve_piece(
        &self,
        endpoint: &ProviderEndpoint,
        grant: TransferGrant,
        hash: &ContentHash,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let grant = grant.validate(endpoint)?;
        let address = endpoint.address();

        let transfer = async {
            let mut client = self.dial(endpoint).await?;
            let request = RetrieveReq {
                version: PROTOCOL_VERSION,
                auth: grant.auth,
                ticket: grant.ticket,
                key: hash.to_vec(),
            };

            let mut stream = client
                .retrieve(request)
                .await
                .map_err(|status| status_to_error(&address, status))?
                .into_inner();

            let mut out = tokio::fs::File::create(dest).await?;
            let mut received = 0u64;
            while let Some(msg) = stream
                .message()
                .await
                .map_err(|status| status_to_error(&address, status))?
            {
                out.write_all(&msg.data).await?;
                received += msg.data.len() as u64;
            }
            out.flush().await?;

            debug!(bytes = received, "Piece retrieved");
            Ok(received)
        };

        self.bounded(endpoint, cancel, transfer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ProviderEndpoint {
        ProviderEndpoint::new(vec![1, 2], "10.0.0.7", 6000)
    }

    fn candidate(port: u32, spare: bool) -> Candidate {
        Candidate {
            endpoint: ProviderEndpoint::new(vec![port as u8], "10.0.0.1", port),
            grant: TransferGrant::new(vec![1], "t", 0),
            spare,
        }
    }

    #[test]
    fn test_empty_grant_rejected() {
        let err = TransferGrant::new(vec![], "ticket", 0)
            .validate(&endpoint())
            .unwrap_err();
        assert!(matches!(err, CumulusError::GrantExpired { .. }));

        assert!(TransferGrant::new(vec![1], "", 0)
            .validate(&endpoint())
            .is_err());
    }

    #[test]
    fn test_expired_grant_rejected() {
        let past = unix_now() - 60;
        assert!(TransferGrant::new(vec![1], "t", past)
            .validate(&endpoint())
            .is_err());

        let future = unix_now() + 600;
        assert!(TransferGrant::new(vec![1], "t", future)
            .validate(&endpoint())
            .is_ok());
        assert!(TransferGrant::new(vec![1], "t", 0)
            .validate(&endpoint())
            .is_ok());
    }

    #[test]
    fn test_first_candidate() {
        let ranked = FirstCandidate.rank(vec![candidate(1, false), candidate(2, false)]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].endpoint.port, 1);
        assert!(FirstCandidate.rank(Vec::new()).is_empty());
    }

    #[test]
    fn test_primary_then_spare() {
        let ranked = PrimaryThenSpare.rank(vec![
            candidate(1, true),
            candidate(2, false),
            candidate(3, false),
        ]);
        let ports: Vec<u32> = ranked.iter().map(|c| c.endpoint.port).collect();
        assert_eq!(ports, vec![2, 3, 1]);
    }

    #[test]
    fn test_grant_debug_hides_auth() {
        let grant = TransferGrant::new(vec![0xde, 0xad], "ticket-1", 0);
        let debug = format!("{:?}", grant);
        assert!(debug.contains("ticket-1"));
        assert!(!debug.contains("222"));
    }

    #[tokio::test]
    async fn test_send_chunks_splits_and_carries_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("piece");
        std::fs::write(&path, vec![7u8; 10]).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let header = StoreReq {
            key: vec![9; 32],
            file_size: 10,
            first: true,
            ..Default::default()
        };
        let sent = send_chunks(path, header, 4, tx).await.unwrap();
        assert_eq!(sent, 10);

        let mut msgs = Vec::new();
        while let Some(msg) = rx.recv().await {
            msgs.push(msg);
        }
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].key, vec![9; 32]);
        assert!(msgs[0].first);
        assert!(msgs[1].key.is_empty());
        assert_eq!(msgs.iter().map(|m| m.data.len()).sum::<usize>(), 10);
    }

    #[tokio::test]
    async fn test_send_chunks_empty_piece_sends_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let header = StoreReq {
            first: true,
            ..Default::default()
        };
        assert_eq!(send_chunks(path, header, 4, tx).await.unwrap(), 0);
        assert!(rx.recv().await.unwrap().first);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_expired_grant_fails_before_dialing() {
        let transport = GrpcProviderTransport::default();
        let piece = PieceUpload {
            hash: ContentHash::compute(b"x"),
            size: 1,
            path: PathBuf::from("/nonexistent"),
            first: true,
        };
        let err = transport
            .store_piece(
                &endpoint(),
                TransferGrant::new(vec![], "", 0),
                &piece,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CumulusError::GrantExpired { .. }));
    }
}
