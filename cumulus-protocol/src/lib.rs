//! Cumulus Protocol Definitions
//!
//! Protocol Buffers messages and gRPC clients for the two remote services a
//! Cumulus client talks to.
//!
//! # Services
//! - `MetadataService` - Tracker: existence checks, placement, file catalog
//! - `ProviderService` - Storage providers: store/retrieve pieces

/// Tracker messages and client
pub mod tracker;

/// Provider messages and client
pub mod provider;

pub use provider::provider_service_client::ProviderServiceClient;
pub use tracker::metadata_service_client::MetadataServiceClient;

/// Version stamped on every request
pub const PROTOCOL_VERSION: u32 = 1;

/// Status code the tracker and providers use for success
pub const CODE_OK: u32 = 0;

/// A request carrying an Ed25519 signature in its `sign` field
pub trait Signable: ::prost::Message + Clone {
    fn signature_mut(&mut self) -> &mut Vec<u8>;

    fn signature(&self) -> &[u8];

    /// Encoding of the request with the signature field emptied
    fn signing_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signature_mut().clear();
        unsigned.encode_to_vec()
    }
}
