//! Upload Command
//!
//! Uploads a file or a directory tree into a remote folder.

use super::{format_bytes, spinner};
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use cumulus_client::{Client, UploadRequest, UploadResult};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Upload configuration
pub struct UploadConfig {
    pub path: PathBuf,
    pub parent: String,
    pub new_version: bool,
}

/// Run upload command
pub async fn run(client: &Client, config: UploadConfig, cancel: &CancellationToken) -> Result<()> {
    let metadata = tokio::fs::metadata(&config.path)
        .await
        .with_context(|| format!("Path does not exist: {}", config.path.display()))?;

    if metadata.is_dir() {
        upload_directory(client, &config, cancel).await
    } else {
        upload_single_file(client, &config, cancel).await
    }
}

async fn upload_single_file(
    client: &Client,
    config: &UploadConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let pb = spinner(format!("Uploading {}", config.path.display()));

    let request =
        UploadRequest::new(&config.path, config.parent.clone()).new_version(config.new_version);
    let report = client.upload(request, cancel).await;
    pb.finish_and_clear();
    let report = report.context("Failed to upload file")?;

    let how = match &report.result {
        UploadResult::Deduplicated => "already stored, nothing transferred".to_string(),
        UploadResult::Inline => "stored inline with the tracker".to_string(),
        UploadResult::Stored {
            strategy,
            partitions,
            pieces,
        } => format!(
            "{} pieces in {} partitions ({})",
            pieces,
            partitions,
            strategy.as_str()
        ),
    };

    println!(
        "{} {}\n  Hash: {}\n  Size: {}\n  {}",
        style(symbols::CHECK).green(),
        style(report.path.display()).bold(),
        report.file_hash,
        format_bytes(report.file_size),
        how
    );
    if report.replica_failures > 0 {
        println!(
            "  {} {} replica providers failed",
            style(symbols::WARN).yellow(),
            report.replica_failures
        );
    }

    Ok(())
}

async fn upload_directory(
    client: &Client,
    config: &UploadConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let pb = spinner(format!("Uploading directory {}", config.path.display()));
    let summary = client
        .upload_dir(&config.path, &config.parent, config.new_version, cancel)
        .await;
    pb.finish_and_clear();
    let summary = summary.context("Failed to upload directory")?;

    println!("\n{}", style("Upload Summary:").bold());
    println!(
        "  {} files uploaded successfully",
        style(summary.succeeded).green()
    );
    println!("  {} folders created", summary.folders);

    if !summary.is_complete() {
        for (path, err) in &summary.failed {
            eprintln!("  {} {}: {}", style(symbols::CROSS).red(), path, err);
        }
        anyhow::bail!("{} files failed to upload", summary.failed.len());
    }

    Ok(())
}
