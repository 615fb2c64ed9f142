//! Cumulus CLI
//!
//! Command-line client for storing files on a Cumulus network.
//!
//! # Commands
//! - `upload` - Upload a file or directory
//! - `download` - Download one file by hash
//! - `download-dir` - Download a remote folder tree
//! - `list` - List a remote folder
//! - `mkdir` - Create remote folders
//! - `rm` - Remove a remote file or folder
//! - `encrypt` - Password-encrypt a local file
//! - `decrypt` - Decrypt a local file
//! - `keygen` - Create the node key
//! - `config` - Show or initialize configuration
//!
//! # Configuration
//! Config file: ~/.cumulus/config.toml
//! Node key: ~/.cumulus/node.key

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cumulus_client::{Client, ClientConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

mod commands;
mod symbols;

use commands::{config, crypt, download, folder, keygen, list, upload};

#[derive(Parser)]
#[command(name = "cumulus")]
#[command(about = "Cumulus distributed storage CLI")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.cumulus/config.toml)
    #[arg(long, global = true, env = "CUMULUS_CONFIG")]
    config: Option<PathBuf>,

    /// Tracker URL (overrides config file and environment)
    #[arg(long, global = true)]
    tracker: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file or directory
    Upload {
        /// Path to file or directory
        path: PathBuf,

        /// Remote folder to upload into
        #[arg(short, long, default_value = "/")]
        parent: String,

        /// Store as a new version when the name already exists
        #[arg(long)]
        new_version: bool,
    },

    /// Download one file by content hash
    Download {
        /// Hex content hash
        hash: String,

        /// File size in bytes
        size: u64,

        /// Output file
        output: PathBuf,
    },

    /// Download a remote folder tree
    DownloadDir {
        /// Remote folder
        remote: String,

        /// Local directory
        local: PathBuf,
    },

    /// List a remote folder
    List {
        /// Remote folder
        #[arg(default_value = "/")]
        path: String,

        /// Page number, from 1
        #[arg(long, default_value = "1")]
        page: u32,

        /// Entries per page
        #[arg(long, default_value = "100")]
        page_size: u32,

        /// Sort by name, size or modtime
        #[arg(long, default_value = "name")]
        sort: String,

        /// Descending order
        #[arg(long)]
        desc: bool,
    },

    /// Create folders under a remote parent
    Mkdir {
        /// Remote parent folder
        parent: String,

        /// Folder names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove a remote file or folder
    Rm {
        /// Remote path
        target: String,

        /// Remove folders with their contents
        #[arg(short, long)]
        recursive: bool,
    },

    /// Encrypt a local file with a password
    Encrypt {
        /// File to encrypt
        input: PathBuf,

        /// Output file (defaults to replacing the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Password (prompted when not given)
        #[arg(long, env = "CUMULUS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt a file produced by `encrypt`
    Decrypt {
        /// File to decrypt
        input: PathBuf,

        /// Output file (defaults to replacing the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Password (prompted when not given)
        #[arg(long, env = "CUMULUS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Generate the node key
    Keygen {
        /// Overwrite an existing key
        #[arg(short, long)]
        force: bool,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let cfg = load_config(&config_path, cli.tracker.clone())?;

    match cli.command {
        Commands::Config { command } => match command {
            None | Some(ConfigCommands::Show) => config::show(&cfg, &config_path)?,
            Some(ConfigCommands::Path) => println!("{}", config_path.display()),
            Some(ConfigCommands::Init { force }) => config::init(&config_path, force)?,
        },

        Commands::Keygen { force } => keygen::run(&cfg, force)?,

        Commands::Encrypt {
            input,
            output,
            password,
        } => crypt::encrypt(crypt::CryptConfig {
            input,
            output,
            password,
        })?,

        Commands::Decrypt {
            input,
            output,
            password,
        } => crypt::decrypt(crypt::CryptConfig {
            input,
            output,
            password,
        })?,

        Commands::Upload {
            path,
            parent,
            new_version,
        } => {
            let client = connect(&cfg).await?;
            let config = upload::UploadConfig {
                path,
                parent,
                new_version,
            };
            upload::run(&client, config, &cancel_on_ctrl_c()).await?;
        }

        Commands::Download { hash, size, output } => {
            let client = connect(&cfg).await?;
            let config = download::DownloadConfig { hash, size, output };
            download::run(&client, config, &cancel_on_ctrl_c()).await?;
        }

        Commands::DownloadDir { remote, local } => {
            let client = connect(&cfg).await?;
            download::run_dir(&client, &remote, &local, &cancel_on_ctrl_c()).await?;
        }

        Commands::List {
            path,
            page,
            page_size,
            sort,
            desc,
        } => {
            let client = connect(&cfg).await?;
            let config = list::ListConfig {
                path,
                page,
                page_size,
                sort,
                descending: desc,
            };
            list::run(&client, config).await?;
        }

        Commands::Mkdir { parent, names } => {
            let client = connect(&cfg).await?;
            folder::mkdir(&client, &parent, &names).await?;
        }

        Commands::Rm { target, recursive } => {
            let client = connect(&cfg).await?;
            folder::remove(&client, &target, recursive).await?;
        }
    }

    Ok(())
}

async fn connect(cfg: &ClientConfig) -> Result<Client> {
    Client::connect(cfg)
        .await
        .with_context(|| format!("Failed to connect to tracker at {}", cfg.tracker.address))
}

/// File, then environment, then flags
fn load_config(path: &std::path::Path, tracker: Option<String>) -> Result<ClientConfig> {
    let cfg = if path.exists() {
        ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        ClientConfig::default()
    };

    let mut cfg = cfg.with_env_overrides();
    if let Some(tracker) = tracker {
        cfg.tracker.address = tracker;
    }
    Ok(cfg)
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling transfers");
            token.cancel();
        }
    });
    cancel
}
