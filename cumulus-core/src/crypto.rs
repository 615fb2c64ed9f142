//! Password-based file encryption
//!
//! AES-256-GCM with a key derived from the password by Argon2id. A sealed
//! file is self-describing:
//!
//! ```text
//! magic "CMLS" | version u8 | salt [16] | nonce [12] | ciphertext + tag
//! ```
//!
//! The salt and nonce are fresh for every encryption, so sealing the same
//! file twice yields different bytes (and a different content hash).

use crate::error::{CumulusError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// AES-256-GCM key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (12 bytes / 96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Argon2 salt size
pub const SALT_SIZE: usize = 16;

/// Shortest password accepted for sealing
pub const MIN_PASSWORD_LEN: usize = 8;

const MAGIC: &[u8; 4] = b"CMLS";
const FORMAT_VERSION: u8 = 1;
const HEADER_SIZE: usize = MAGIC.len() + 1 + SALT_SIZE + NONCE_SIZE;

/// Bytes a sealed file adds on top of its plaintext
pub const SEAL_OVERHEAD: usize = HEADER_SIZE + TAG_SIZE;

/// AES-256-GCM key derived from a password
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Derive a key from `password` and `salt` with Argon2id defaults
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| CumulusError::Encryption(e.to_string()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| CumulusError::Encryption(e.to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

fn check_password(password: &[u8]) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(CumulusError::Configuration(format!(
            "password must be at least {} bytes",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Encrypt `plaintext` under `password` into the sealed format
pub fn seal(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    check_password(password)?;

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = EncryptionKey::derive_from_password(password, &salt)?;
    let ciphertext = key
        .cipher()?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CumulusError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt bytes produced by [`seal`]
///
/// A wrong password and tampered bytes are indistinguishable; both fail
/// authentication.
pub fn open(sealed: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEAL_OVERHEAD || &sealed[..MAGIC.len()] != MAGIC {
        return Err(CumulusError::Decryption("not a sealed file".to_string()));
    }
    let version = sealed[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(CumulusError::Decryption(format!(
            "unsupported format version {}",
            version
        )));
    }

    let salt_start = MAGIC.len() + 1;
    let nonce_start = salt_start + SALT_SIZE;
    let salt = &sealed[salt_start..nonce_start];
    let nonce = &sealed[nonce_start..HEADER_SIZE];

    let key = EncryptionKey::derive_from_password(password, salt)?;
    key.cipher()?
        .decrypt(Nonce::from_slice(nonce), &sealed[HEADER_SIZE..])
        .map_err(|_| CumulusError::Decryption("authentication failed".to_string()))
}

/// Encrypt the file at `input` into `output`, returning bytes written.
///
/// `output` may equal `input`; the result is written to a temporary file in
/// the output directory and renamed into place.
pub fn encrypt_file(input: &Path, password: &[u8], output: &Path) -> Result<u64> {
    let plaintext = std::fs::read(input)?;
    let sealed = seal(&plaintext, password)?;
    replace_file(output, &sealed)?;
    debug!(input = %input.display(), output = %output.display(), bytes = sealed.len(), "File encrypted");
    Ok(sealed.len() as u64)
}

/// Decrypt a sealed file at `input` into `output`, returning bytes written.
///
/// Nothing is written when authentication fails.
pub fn decrypt_file(input: &Path, password: &[u8], output: &Path) -> Result<u64> {
    let sealed = std::fs::read(input)?;
    let plaintext = open(&sealed, password)?;
    replace_file(output, &plaintext)?;
    debug!(input = %input.display(), output = %output.display(), bytes = plaintext.len(), "File decrypted");
    Ok(plaintext.len() as u64)
}

fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staging = tempfile::NamedTempFile::new_in(dir)?;
    staging.write_all(data)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| CumulusError::Io(e.error))?;
    Ok(())
}
