//! `cumulus.provider.ProviderService` messages
//!
//! `Store` is client-streaming: the first message carries the grant, key and
//! total size, every message carries a slice of the piece. `Retrieve` is
//! server-streaming and returns the piece in chunks.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoreReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub auth: Vec<u8>,
    #[prost(string, tag = "3")]
    pub ticket: String,
    /// Content hash of the piece
    #[prost(bytes = "vec", tag = "4")]
    pub key: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub file_size: u64,
    /// Set on the first piece of an upload so the provider can open a session
    #[prost(bool, tag = "6")]
    pub first: bool,
    #[prost(bytes = "bytes", tag = "7")]
    pub data: ::bytes::Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoreResp {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub err_msg: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveReq {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub auth: Vec<u8>,
    #[prost(string, tag = "3")]
    pub ticket: String,
    #[prost(bytes = "vec", tag = "4")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveResp {
    #[prost(bytes = "bytes", tag = "1")]
    pub data: ::bytes::Bytes,
}

/// Client for `cumulus.provider.ProviderService`
pub mod provider_service_client {
    use super::*;
    use tonic::codec::{ProstCodec, Streaming};
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;

    #[derive(Debug, Clone)]
    pub struct ProviderServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl ProviderServiceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        async fn ready(&mut self) -> Result<(), tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unavailable(format!("provider was not ready: {}", e))
            })
        }

        pub async fn store(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = StoreReq>,
        ) -> Result<tonic::Response<StoreResp>, tonic::Status> {
            self.ready().await?;
            let codec: ProstCodec<StoreReq, StoreResp> = ProstCodec::default();
            let path = PathAndQuery::from_static("/cumulus.provider.ProviderService/Store");
            self.inner
                .client_streaming(request.into_streaming_request(), path, codec)
                .await
        }

        pub async fn retrieve(
            &mut self,
            request: impl tonic::IntoRequest<RetrieveReq>,
        ) -> Result<tonic::Response<Streaming<RetrieveResp>>, tonic::Status> {
            self.ready().await?;
            let codec: ProstCodec<RetrieveReq, RetrieveResp> = ProstCodec::default();
            let path = PathAndQuery::from_static("/cumulus.provider.ProviderService/Retrieve");
            self.inner
                .server_streaming(request.into_request(), path, codec)
                .await
        }
    }
}
