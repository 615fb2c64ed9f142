//! Request signing

use cumulus_core::NodeIdentity;
use cumulus_protocol::Signable;

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Fill the `sign` field of `request` with the node's signature
pub fn sign_request<R: Signable>(identity: &NodeIdentity, mut request: R) -> R {
    let signature = identity.sign(&request.signing_bytes());
    *request.signature_mut() = signature;
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_protocol::tracker::MkFolderReq;

    #[test]
    fn test_signature_verifies_against_unsigned_encoding() {
        let identity = NodeIdentity::generate();
        let req = sign_request(
            &identity,
            MkFolderReq {
                node_id: identity.node_id().to_vec(),
                timestamp: unix_now(),
                folder: vec!["photos".into()],
                ..Default::default()
            },
        );

        assert_eq!(req.sign.len(), 64);
        NodeIdentity::verify(&identity.verifying_key(), &req.signing_bytes(), &req.sign).unwrap();
    }
}
