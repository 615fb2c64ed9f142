//! List Command
//!
//! Lists one page of a remote folder.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use console::style;
use cumulus_client::{CatalogEntry, Client, ListQuery, SortKey};

/// List configuration
pub struct ListConfig {
    pub path: String,
    pub page: u32,
    pub page_size: u32,
    pub sort: String,
    pub descending: bool,
}

/// Run list command
pub async fn run(client: &Client, config: ListConfig) -> Result<()> {
    let sort: SortKey = config.sort.parse()?;
    let query = ListQuery {
        path: config.path.clone(),
        page_size: config.page_size.max(1),
        page_num: config.page.max(1),
        sort,
        ascending: !config.descending,
    };

    let page = client
        .list_files(&query)
        .await
        .with_context(|| format!("Failed to list {}", config.path))?;

    if page.entries.is_empty() {
        println!(
            "{} No entries in '{}' on page {}",
            style("Info:").cyan(),
            config.path,
            query.page_num
        );
        return Ok(());
    }

    println!(
        "{:<40} {:>12} {:>20}  {}",
        style("NAME").bold(),
        style("SIZE").bold(),
        style("MODIFIED").bold(),
        style("HASH").bold()
    );
    println!("{}", symbols::HLINE.repeat(100));

    for entry in &page.entries {
        println!("{}", format_entry(entry));
    }

    println!("{}", symbols::HLINE.repeat(100));
    let pages = page.total.div_ceil(query.page_size);
    println!(
        "{} of {} entries, page {}/{}",
        style(page.entries.len()).green(),
        page.total,
        query.page_num,
        pages.max(1)
    );

    Ok(())
}

fn format_entry(entry: &CatalogEntry) -> String {
    let name = if entry.is_folder {
        format!("{} {}/", symbols::FOLDER, entry.name)
    } else {
        entry.name.clone()
    };
    let size = if entry.is_folder {
        "-".to_string()
    } else {
        format_bytes(entry.file_size)
    };
    let hash = entry.file_hash.as_ref().map(|h| h.to_hex()).unwrap_or_default();

    format!(
        "{:<40} {:>12} {:>20}  {}",
        truncate_name(&name, 40),
        size,
        format_time(entry.mod_time),
        hash
    )
}

fn format_time(unix_secs: u64) -> String {
    if unix_secs == 0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp(unix_secs as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Keep the tail of long names, where the extension is
fn truncate_name(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        name.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
