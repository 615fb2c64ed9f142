//! Config Command
//!
//! Shows the effective configuration or writes a default file.

use crate::symbols;
use anyhow::Result;
use console::style;
use cumulus_client::ClientConfig;
use std::path::Path;

/// Print the configuration after file, environment and flag overrides
pub fn show(cfg: &ClientConfig, path: &Path) -> Result<()> {
    println!();
    println!("{}", style("Cumulus Configuration").bold().underlined());
    println!();
    println!("{}", cfg.to_toml_string()?);

    println!("{} {}", style("Config file:").dim(), path.display());
    if !path.exists() {
        println!(
            "{} Run '{}' to create it",
            style("(not created yet)").yellow(),
            style("cumulus config init").green()
        );
    }
    if let Err(e) = cfg.validate() {
        println!("{} {}", style(symbols::WARN).yellow(), e);
    }
    if !cfg.key_file().exists() {
        println!(
            "{} No node key at {}. Run '{}'",
            style(symbols::WARN).yellow(),
            cfg.key_file().display(),
            style("cumulus keygen").green()
        );
    }
    Ok(())
}

/// Write a default config file unless one exists
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!(
            "{} Config file already exists at {}",
            style(symbols::WARN).yellow(),
            path.display()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    ClientConfig::default().save(path)?;
    println!(
        "{} Config file created at {}",
        style(symbols::CHECK).green(),
        path.display()
    );
    Ok(())
}
