//! Configuration system for tessera.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TESSERA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/tessera/config.toml
//!   3. ~/.config/tessera/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the content-addressed chunk store.
    pub blob_path: PathBuf,
}

/// Settings for the arbitrary-data manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum handshaked, well-behaved peers before the scavenger will
    /// request data from the network.
    pub min_peers: usize,

    /// Answer unknown chunk requests with the empty block-summaries
    /// sentinel older peers expect, instead of the dedicated
    /// file-unknown message.
    pub legacy_file_unknown: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_path: data_dir().join("blobs"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_peers: 3,
            legacy_file_unknown: true,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("tessera")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("tessera")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TesseraConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            TesseraConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TESSERA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TesseraConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TESSERA_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TESSERA_STORAGE__BLOB_PATH") {
            self.storage.blob_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TESSERA_SYNC__MIN_PEERS") {
            if let Ok(n) = v.parse() {
                self.sync.min_peers = n;
            }
        }
        if let Ok(v) = std::env::var("TESSERA_SYNC__LEGACY_FILE_UNKNOWN") {
            self.sync.legacy_file_unknown = v == "true" || v == "1";
        }
    }
}
