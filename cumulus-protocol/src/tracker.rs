//! `cumulus.tracker.MetadataService` messages
//!
//! Every response carries a numeric `code` (0 = success) and `err_msg`.
//! Every request carries the node id, a unix timestamp and an Ed25519
//! signature over the request encoded with `sign` left empty.

use crate::Signable;

/// Storage strategy chosen by the tracker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FileStoreType {
    ErasureCode = 0,
    MultiReplica = 1,
}

/// Listing order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SortType {
    Name = 0,
    Size = 1,
    ModTime = 2,
}

/// Remote folder path
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilePath {
    #[prost(string, tag = "1")]
    pub path: String,
}

impl FilePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

// ===== CheckFileExist =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckFileExistReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(message, optional, tag = "4")]
    pub parent: Option<FilePath>,
    #[prost(bytes = "vec", tag = "5")]
    pub file_hash: Vec<u8>,
    #[prost(uint64, tag = "6")]
    pub file_size: u64,
    #[prost(string, tag = "7")]
    pub file_name: String,
    #[prost(uint64, tag = "8")]
    pub file_mod_time: u64,
    /// Whole file contents, only for files below the inline threshold
    #[prost(bytes = "vec", tag = "9")]
    pub file_data: Vec<u8>,
    #[prost(bool, tag = "10")]
    pub interactive: bool,
    #[prost(bool, tag = "11")]
    pub new_version: bool,
    #[prost(bytes = "vec", tag = "12")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckFileExistResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
    #[prost(bool, tag = "3")]
    pub exist: bool,
    #[prost(enumeration = "FileStoreType", tag = "4")]
    pub store_type: i32,
    #[prost(uint32, tag = "5")]
    pub data_piece_count: u32,
    #[prost(uint32, tag = "6")]
    pub verify_piece_count: u32,
    /// Replica targets, one grant each (multi-replica strategy only)
    #[prost(message, repeated, tag = "7")]
    pub provider: Vec<ReplicaProvider>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReplicaProvider {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub server: String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub auth: Vec<u8>,
    #[prost(string, tag = "5")]
    pub ticket: String,
    /// Grant expiry, unix seconds; 0 when the tracker sets none
    #[prost(uint64, tag = "6")]
    pub time: u64,
}

// ===== UploadFilePrepare =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PieceHashAndSize {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SplitPartition {
    #[prost(message, repeated, tag = "1")]
    pub piece: Vec<PieceHashAndSize>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadFilePrepareReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub file_hash: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub file_size: u64,
    #[prost(message, repeated, tag = "6")]
    pub partition: Vec<SplitPartition>,
    #[prost(bytes = "vec", tag = "7")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PieceHashAuth {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth: Vec<u8>,
    #[prost(string, tag = "3")]
    pub ticket: String,
    #[prost(uint64, tag = "4")]
    pub time: u64,
}

/// One candidate provider for one piece
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockProviderAuth {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub server: String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(bool, tag = "4")]
    pub spare: bool,
    #[prost(message, repeated, tag = "5")]
    pub hash_auth: Vec<PieceHashAuth>,
}

/// Candidates for one piece, in the order the pieces were sent
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PieceAssignment {
    #[prost(message, repeated, tag = "1")]
    pub provider_auth: Vec<BlockProviderAuth>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErasureCodePartition {
    #[prost(message, repeated, tag = "1")]
    pub piece: Vec<PieceAssignment>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadFilePrepareResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
    #[prost(message, repeated, tag = "3")]
    pub partition: Vec<ErasureCodePartition>,
}

// ===== UploadFileDone =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoreBlock {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub size: u64,
    #[prost(uint32, tag = "3")]
    pub block_seq: u32,
    /// true for data shards, false for parity shards
    #[prost(bool, tag = "4")]
    pub is_data_shard: bool,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub store_node_id: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StorePartition {
    #[prost(message, repeated, tag = "1")]
    pub block: Vec<StoreBlock>,
    /// Original byte length of the partition before padding
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadFileDoneReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(message, optional, tag = "4")]
    pub parent: Option<FilePath>,
    #[prost(bytes = "vec", tag = "5")]
    pub file_hash: Vec<u8>,
    #[prost(uint64, tag = "6")]
    pub file_size: u64,
    #[prost(string, tag = "7")]
    pub file_name: String,
    #[prost(uint64, tag = "8")]
    pub file_mod_time: u64,
    #[prost(message, repeated, tag = "9")]
    pub partition: Vec<StorePartition>,
    #[prost(bool, tag = "10")]
    pub interactive: bool,
    #[prost(bool, tag = "11")]
    pub new_version: bool,
    #[prost(enumeration = "FileStoreType", tag = "12")]
    pub store_type: i32,
    #[prost(bytes = "vec", tag = "13")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadFileDoneResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
}

// ===== RetrieveFile =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveFileReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub file_hash: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub file_size: u64,
    #[prost(bytes = "vec", tag = "6")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveNode {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub server: String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub auth: Vec<u8>,
    #[prost(string, tag = "5")]
    pub ticket: String,
    #[prost(uint64, tag = "6")]
    pub time: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveBlock {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub size: u64,
    #[prost(uint32, tag = "3")]
    pub block_seq: u32,
    #[prost(bool, tag = "4")]
    pub is_data_shard: bool,
    #[prost(message, repeated, tag = "5")]
    pub store_node: Vec<RetrieveNode>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrievePartition {
    #[prost(message, repeated, tag = "1")]
    pub block: Vec<RetrieveBlock>,
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveFileResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
    /// Inline contents of tiny files
    #[prost(bytes = "vec", tag = "3")]
    pub file_data: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub partition: Vec<RetrievePartition>,
    #[prost(uint32, tag = "5")]
    pub data_piece_count: u32,
    #[prost(uint32, tag = "6")]
    pub verify_piece_count: u32,
}

// ===== ListFiles =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListFilesReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(message, optional, tag = "4")]
    pub parent: Option<FilePath>,
    #[prost(uint32, tag = "5")]
    pub page_size: u32,
    #[prost(uint32, tag = "6")]
    pub page_num: u32,
    #[prost(enumeration = "SortType", tag = "7")]
    pub sort_type: i32,
    #[prost(bool, tag = "8")]
    pub asc_order: bool,
    #[prost(bytes = "vec", tag = "9")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileOrFolder {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub folder: bool,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint64, tag = "4")]
    pub mod_time: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub file_hash: Vec<u8>,
    #[prost(uint64, tag = "6")]
    pub file_size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListFilesResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
    #[prost(uint32, tag = "3")]
    pub total: u32,
    #[prost(message, repeated, tag = "4")]
    pub fof: Vec<FileOrFolder>,
}

// ===== MkFolder =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MkFolderReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(message, optional, tag = "4")]
    pub parent: Option<FilePath>,
    #[prost(string, repeated, tag = "5")]
    pub folder: Vec<String>,
    #[prost(bool, tag = "6")]
    pub interactive: bool,
    #[prost(bytes = "vec", tag = "7")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MkFolderResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
}

// ===== RemoveFile =====

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveFileReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    #[prost(message, optional, tag = "4")]
    pub target: Option<FilePath>,
    #[prost(bool, tag = "5")]
    pub recursive: bool,
    #[prost(bytes = "vec", tag = "6")]
    pub sign: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveFileResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
}

macro_rules! signable {
    ($($req:ty),* $(,)?) => {
        $(
            impl Signable for $req {
                fn signature_mut(&mut self) -> &mut Vec<u8> {
                    &mut self.sign
                }

                fn signature(&self) -> &[u8] {
                    &self.sign
                }
            }
        )*
    };
}

signable!(
    CheckFileExistReq,
    UploadFilePrepareReq,
    UploadFileDoneReq,
    RetrieveFileReq,
    ListFilesReq,
    MkFolderReq,
    RemoveFileReq,
);

/// Numeric status shared by every tracker response
pub trait TrackerStatus {
    fn code(&self) -> u32;
    fn err_msg(&self) -> &str;
}

macro_rules! tracker_status {
    ($($resp:ty),* $(,)?) => {
        $(
            impl TrackerStatus for $resp {
                fn code(&self) -> u32 {
                    self.code
                }

                fn err_msg(&self) -> &str {
                    &self.err_msg
                }
            }
        )*
    };
}

tracker_status!(
    CheckFileExistResp,
    UploadFilePrepareResp,
    UploadFileDoneResp,
    RetrieveFileResp,
    ListFilesResp,
    MkFolderResp,
    RemoveFileResp,
);

/// Client for `cumulus.tracker.MetadataService`
pub mod metadata_service_client {
    use super::*;
    use tonic::codec::ProstCodec;
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;

    const SERVICE: &str = "cumulus.tracker.MetadataService";

    #[derive(Debug, Clone)]
    pub struct MetadataServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl MetadataServiceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        /// Limits the maximum size of a decoded message.
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        /// Limits the maximum size of an encoded message.
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        async fn unary<Req, Resp>(
            &mut self,
            request: impl tonic::IntoRequest<Req>,
            path: &'static str,
        ) -> Result<tonic::Response<Resp>, tonic::Status>
        where
            Req: ::prost::Message + Send + Sync + 'static,
            Resp: ::prost::Message + Default + Send + Sync + 'static,
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unavailable(format!("{} was not ready: {}", SERVICE, e))
            })?;
            let codec: ProstCodec<Req, Resp> = ProstCodec::default();
            self.inner
                .unary(request.into_request(), PathAndQuery::from_static(path), codec)
                .await
        }

        pub async fn check_file_exist(
            &mut self,
            request: impl tonic::IntoRequest<CheckFileExistReq>,
        ) -> Result<tonic::Response<CheckFileExistResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/CheckFileExist")
                .await
        }

        pub async fn upload_file_prepare(
            &mut self,
            request: impl tonic::IntoRequest<UploadFilePrepareReq>,
        ) -> Result<tonic::Response<UploadFilePrepareResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/UploadFilePrepare")
                .await
        }

        pub async fn upload_file_done(
            &mut self,
            request: impl tonic::IntoRequest<UploadFileDoneReq>,
        ) -> Result<tonic::Response<UploadFileDoneResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/UploadFileDone")
                .await
        }

        pub async fn retrieve_file(
            &mut self,
            request: impl tonic::IntoRequest<RetrieveFileReq>,
        ) -> Result<tonic::Response<RetrieveFileResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/RetrieveFile")
                .await
        }

        pub async fn list_files(
            &mut self,
            request: impl tonic::IntoRequest<ListFilesReq>,
        ) -> Result<tonic::Response<ListFilesResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/ListFiles")
                .await
        }

        pub async fn mk_folder(
            &mut self,
            request: impl tonic::IntoRequest<MkFolderReq>,
        ) -> Result<tonic::Response<MkFolderResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/MkFolder")
                .await
        }

        pub async fn remove_file(
            &mut self,
            request: impl tonic::IntoRequest<RemoveFileReq>,
        ) -> Result<tonic::Response<RemoveFileResp>, tonic::Status> {
            self.unary(request, "/cumulus.tracker.MetadataService/RemoveFile")
                .await
        }
    }
}
