//! Encrypt / Decrypt Commands
//!
//! Password-seal a local file before upload, or open one after download.
//! Without `--output` the input file is replaced.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use cumulus_core::crypto::MIN_PASSWORD_LEN;
use cumulus_core::{decrypt_file, encrypt_file};
use std::path::{Path, PathBuf};

/// Encrypt/decrypt configuration
pub struct CryptConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Prompted for when absent
    pub password: Option<String>,
}

impl CryptConfig {
    fn output(&self) -> &Path {
        self.output.as_deref().unwrap_or(&self.input)
    }
}

/// Run encrypt command
pub fn encrypt(config: CryptConfig) -> Result<()> {
    let password = match &config.password {
        Some(password) => password.clone(),
        None => prompt_new_password()?,
    };
    let written = seal_file(&config, &password)?;
    println!(
        "{} Encrypted {} -> {} ({})",
        style(symbols::CHECK).green(),
        config.input.display(),
        style(config.output().display()).bold(),
        format_bytes(written)
    );
    Ok(())
}

/// Run decrypt command
pub fn decrypt(config: CryptConfig) -> Result<()> {
    let password = match &config.password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };
    let written = open_file(&config, &password)?;
    println!(
        "{} Decrypted {} -> {} ({})",
        style(symbols::CHECK).green(),
        config.input.display(),
        style(config.output().display()).bold(),
        format_bytes(written)
    );
    Ok(())
}

fn seal_file(config: &CryptConfig, password: &str) -> Result<u64> {
    encrypt_file(&config.input, password.as_bytes(), config.output())
        .with_context(|| format!("Failed to encrypt {}", config.input.display()))
}

fn open_file(config: &CryptConfig, password: &str) -> Result<u64> {
    decrypt_file(&config.input, password.as_bytes(), config.output())
        .with_context(|| format!("Failed to decrypt {} (wrong password?)", config.input.display()))
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    if password.len() < MIN_PASSWORD_LEN {
        anyhow::bail!("Password must be at least {} characters", MIN_PASSWORD_LEN);
    }

    let confirm =
        rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}
