//! Download Command
//!
//! Downloads one file by content hash, or a whole remote folder tree.

use super::{byte_bar, format_bytes, spinner};
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use cumulus_client::{Client, DownloadRequest, DownloadSource};
use cumulus_core::ContentHash;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Download configuration
pub struct DownloadConfig {
    pub hash: String,
    pub size: u64,
    pub output: PathBuf,
}

/// Run download command
pub async fn run(client: &Client, config: DownloadConfig, cancel: &CancellationToken) -> Result<()> {
    let file_hash = ContentHash::from_hex(config.hash.trim()).context("Invalid content hash")?;
    let key = file_hash.to_hex();

    let pb = byte_bar(config.size, format!("{}", config.output.display()));
    let watcher = {
        let pb = pb.clone();
        let progress = client.progress().clone();
        let key = key.clone();
        tokio::spawn(async move {
            loop {
                if let Some(p) = progress.get(&key) {
                    pb.set_position(p.done.min(p.total));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    };

    let request = DownloadRequest {
        file_hash,
        file_size: config.size,
        output: config.output.clone(),
    };
    let report = client.download(request, cancel).await;
    watcher.abort();
    pb.finish_and_clear();
    let report = report.context("Failed to download file")?;

    let source = match &report.source {
        DownloadSource::Inline => "inline from tracker".to_string(),
        DownloadSource::Replica { provider } => format!("replica from {}", provider),
        DownloadSource::Erasure {
            partitions,
            pieces,
            holes,
        } => {
            let mut s = format!("{} pieces over {} partitions", pieces, partitions);
            if *holes > 0 {
                s.push_str(&format!(", {} rebuilt", holes));
            }
            s
        }
    };

    println!(
        "{} {}\n  Size: {}\n  Source: {}",
        style(symbols::CHECK).green(),
        style(report.output.display()).bold(),
        format_bytes(report.file_size),
        source
    );

    Ok(())
}

/// Download a remote folder tree into `local`
pub async fn run_dir(
    client: &Client,
    remote: &str,
    local: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let pb = spinner(format!("Downloading {}", remote));
    let summary = client.download_dir(remote, local, cancel).await;
    pb.finish_and_clear();
    let summary = summary.context("Failed to download folder")?;

    println!("\n{}", style("Download Summary:").bold());
    println!(
        "  {} files downloaded successfully",
        style(summary.succeeded).green()
    );
    println!("  {} folders", summary.folders);
    println!("  Saved to: {}", local.display());

    if !summary.is_complete() {
        for (path, err) in &summary.failed {
            eprintln!("  {} {}: {}", style(symbols::CROSS).red(), path, err);
        }
        anyhow::bail!("{} files failed to download", summary.failed.len());
    }

    Ok(())
}
