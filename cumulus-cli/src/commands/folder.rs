//! Folder Commands
//!
//! Creates and removes remote folders and files.

use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use cumulus_client::catalog::join_remote;
use cumulus_client::Client;

/// Create `names` under `parent`
pub async fn mkdir(client: &Client, parent: &str, names: &[String]) -> Result<()> {
    client
        .mk_folder(parent, names)
        .await
        .with_context(|| format!("Failed to create folders under {}", parent))?;

    for name in names {
        println!(
            "{} Created {}",
            style(symbols::CHECK).green(),
            join_remote(parent, name)
        );
    }
    Ok(())
}

/// Remove a remote file or folder
pub async fn remove(client: &Client, target: &str, recursive: bool) -> Result<()> {
    client
        .remove(target, recursive)
        .await
        .with_context(|| format!("Failed to remove {}", target))?;

    println!("{} Removed: {}", style(symbols::CHECK).green(), target);
    Ok(())
}
