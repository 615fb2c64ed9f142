//! Keygen Command
//!
//! Creates the Ed25519 node key that signs every tracker request.

use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use cumulus_client::ClientConfig;
use cumulus_core::NodeIdentity;
use std::path::Path;

/// Run keygen command
pub fn run(cfg: &ClientConfig, force: bool) -> Result<()> {
    let path = cfg.key_file();
    match write_key(&path, force)? {
        Some(identity) => {
            println!(
                "{} Node key written to {}",
                style(symbols::CHECK).green(),
                path.display()
            );
            println!("  Node id: {}", identity.node_id_hex());
        }
        None => {
            println!(
                "{} Key file already exists at {}",
                style(symbols::WARN).yellow(),
                path.display()
            );
            println!("Use --force to overwrite");
        }
    }
    Ok(())
}

/// `None` when a key is already there and `force` is off
fn write_key(path: &Path, force: bool) -> Result<Option<NodeIdentity>> {
    if path.exists() && !force {
        return Ok(None);
    }
    let identity = NodeIdentity::generate();
    identity
        .save(path)
        .with_context(|| format!("Failed to write key to {}", path.display()))?;
    Ok(Some(identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_key_is_kept_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keys").join("node.key");

        let first = write_key(&path, false).unwrap().unwrap();
        assert!(write_key(&path, false).unwrap().is_none());

        let loaded = NodeIdentity::load(&path).unwrap();
        assert_eq!(loaded.node_id(), first.node_id());

        let second = write_key(&path, true).unwrap().unwrap();
        assert_ne!(second.node_id(), first.node_id());
    }
}
