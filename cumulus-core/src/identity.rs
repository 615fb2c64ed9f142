//! Node identity
//!
//! Every tracker request is signed with the node's Ed25519 key. The identity
//! is an explicit value handed to each operation; nothing reads it from
//! process-wide state.

use crate::error::{CumulusError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use std::path::Path;

/// Node id plus signing key
#[derive(Clone)]
pub struct NodeIdentity {
    node_id: Vec<u8>,
    signing_key: SigningKey,
}

impl NodeIdentity {
    /// Generate a fresh key; the node id defaults to the public key
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let node_id = signing_key.verifying_key().to_bytes().to_vec();
        Self {
            node_id,
            signing_key,
        }
    }

    /// Parse a hex-encoded 32-byte secret key
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| CumulusError::MissingIdentity(format!("invalid key hex: {}", e)))?;
        let secret: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            CumulusError::MissingIdentity(format!(
                "expected {} byte secret key, got {}",
                SECRET_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret)))
    }

    /// Load a key file containing the hex secret
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CumulusError::MissingIdentity(format!("cannot read key file {}: {}", path.display(), e))
        })?;
        Self::from_secret_hex(&content)
    }

    /// Write the hex secret to `path`, readable by the owner only
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.secret_hex())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Override the node id registered with the tracker
    pub fn with_node_id(mut self, node_id: Vec<u8>) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn node_id(&self) -> &[u8] {
        &self.node_id
    }

    pub fn node_id_hex(&self) -> String {
        hex::encode(&self.node_id)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Check a signature produced by [`NodeIdentity::sign`]
    pub fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<()> {
        let signature = Signature::from_slice(signature)
            .map_err(|e| CumulusError::Signature(e.to_string()))?;
        key.verify(message, &signature)
            .map_err(|e| CumulusError::Signature(e.to_string()))
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id_hex())
            .finish_non_exhaustive()
    }
}
