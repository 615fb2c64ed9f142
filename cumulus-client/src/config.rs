//! Configuration management for the Cumulus client
//!
//! Loaded from a TOML file, validated, then overridden by environment
//! variables. The binary applies its own flags last.

use crate::download::DownloadSettings;
use crate::provider::TransferSettings;
use crate::tracker::TrackerSettings;
use crate::upload::UploadSettings;
use cumulus_core::{
    CumulusError, ErasureConfig, NodeIdentity, DATA_SHARDS, DEFAULT_INLINE_THRESHOLD,
    DEFAULT_PARTITION_SIZE, PARITY_SHARDS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for CumulusError {
    fn from(err: ConfigError) -> Self {
        CumulusError::Configuration(err.to_string())
    }
}

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub tracker: TrackerSection,

    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub transfer: TransferSection,
}

/// Tracker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSection {
    #[serde(default = "default_tracker_addr")]
    pub address: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// CA certificate; enables TLS to the tracker when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            address: default_tracker_addr(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            ca_cert: None,
        }
    }
}

fn default_tracker_addr() -> String {
    "http://127.0.0.1:7788".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    15
}

/// Node identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Hex-encoded Ed25519 secret
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    /// Hex node id registered with the tracker; defaults to the public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
            node_id: None,
        }
    }
}

fn default_key_file() -> PathBuf {
    config_dir().join("node.key")
}

/// Local storage and coding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    #[serde(default = "default_partition_size")]
    pub partition_size: u64,

    #[serde(default = "default_inline_threshold")]
    pub inline_threshold: u64,

    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            partition_size: default_partition_size(),
            inline_threshold: default_inline_threshold(),
            data_shards: default_data_shards(),
            parity_shards: default_parity_shards(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("cumulus")
}

fn default_partition_size() -> u64 {
    DEFAULT_PARTITION_SIZE
}

fn default_inline_threshold() -> u64 {
    DEFAULT_INLINE_THRESHOLD
}

fn default_data_shards() -> usize {
    DATA_SHARDS
}

fn default_parity_shards() -> usize {
    PARITY_SHARDS
}

/// Provider transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSection {
    #[serde(default = "default_transfer_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bytes per streamed message
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pieces of one partition sent concurrently after piece 0
    #[serde(default = "default_parallel_pieces")]
    pub parallel_pieces: usize,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_transfer_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            chunk_size: default_chunk_size(),
            parallel_pieces: default_parallel_pieces(),
        }
    }
}

fn default_transfer_timeout() -> u64 {
    120
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_parallel_pieces() -> usize {
    4
}

/// `~/.cumulus`
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cumulus")
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl ClientConfig {
    /// `~/.cumulus/config.toml`
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.tracker.address.trim();
        if addr.is_empty() {
            return Err(ConfigError::ValidationError(
                "tracker address is not set".to_string(),
            ));
        }
        if !addr.starts_with("http://") && !addr.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "tracker address must start with http:// or https://, got {}",
                addr
            )));
        }
        if self.node.key_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "node key file is not set".to_string(),
            ));
        }

        ErasureConfig::new(self.storage.data_shards, self.storage.parity_shards)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.storage.partition_size == 0 {
            return Err(ConfigError::ValidationError(
                "partition_size must be > 0".to_string(),
            ));
        }
        if self.storage.inline_threshold > self.storage.partition_size {
            return Err(ConfigError::ValidationError(
                "inline_threshold cannot exceed partition_size".to_string(),
            ));
        }
        if self.transfer.chunk_size == 0 || self.transfer.parallel_pieces == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_size and parallel_pieces must be > 0".to_string(),
            ));
        }
        if self.tracker.request_timeout_secs == 0 || self.transfer.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("CUMULUS_TRACKER_ADDR") {
            self.tracker.address = addr;
        }

        if let Ok(key_file) = std::env::var("CUMULUS_NODE_KEY_FILE") {
            self.node.key_file = PathBuf::from(key_file);
        }

        if let Ok(dir) = std::env::var("CUMULUS_SCRATCH_DIR") {
            self.storage.scratch_dir = PathBuf::from(dir);
        }

        self
    }

    pub fn key_file(&self) -> PathBuf {
        expand_home(&self.node.key_file)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        expand_home(&self.storage.scratch_dir)
    }

    /// Load the node key, applying the configured node id if any
    pub fn load_identity(&self) -> Result<NodeIdentity, CumulusError> {
        let identity = NodeIdentity::load(self.key_file())?;
        match &self.node.node_id {
            Some(id) => {
                let node_id = hex::decode(id).map_err(|e| {
                    CumulusError::Configuration(format!("node_id is not hex: {}", e))
                })?;
                Ok(identity.with_node_id(node_id))
            }
            None => Ok(identity),
        }
    }

    pub fn erasure_config(&self) -> Result<ErasureConfig, CumulusError> {
        ErasureConfig::new(self.storage.data_shards, self.storage.parity_shards)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            address: self.tracker.address.trim().to_string(),
            connect_timeout: Duration::from_secs(self.tracker.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.tracker.request_timeout_secs),
            ca_cert: self.tracker.ca_cert.as_deref().map(expand_home),
            ..TrackerSettings::default()
        }
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            timeout: Duration::from_secs(self.transfer.timeout_secs),
            connect_timeout: Duration::from_secs(self.transfer.connect_timeout_secs),
            chunk_size: self.transfer.chunk_size,
            ..TransferSettings::default()
        }
    }

    pub fn upload_settings(&self) -> Result<UploadSettings, CumulusError> {
        Ok(UploadSettings {
            partition_size: self.storage.partition_size,
            inline_threshold: self.storage.inline_threshold,
            erasure: self.erasure_config()?,
            parallel_pieces: self.transfer.parallel_pieces,
        })
    }

    pub fn download_settings(&self) -> Result<DownloadSettings, CumulusError> {
        Ok(DownloadSettings {
            partition_size: self.storage.partition_size,
            erasure: self.erasure_config()?,
        })
    }
}
