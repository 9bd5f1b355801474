//! Configuration for the wallet session manager

pub mod rpc;

use crate::keystore::KdfCost;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Re-export chain constants
pub use rpc::chains;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "WALLET_DATA_DIR";

/// Default data directory (relative to the working directory)
pub const DEFAULT_DATA_DIR: &str = "wallet-data";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for keystore, session settings, and audit log
    pub data_dir: PathBuf,
    /// Chain identifier used for EIP-155 replay protection
    pub chain_id: u64,
    /// Key-derivation cost for newly written keystore files
    #[serde(default)]
    pub kdf: KdfCost,
    /// Multiplier applied to the estimated gas of token transfers
    pub token_gas_multiplier: u64,
    /// Node endpoint used when no endpoint has been remembered
    #[serde(default)]
    pub default_endpoint: Option<String>,
    /// Path to audit log file (JSONL); relative paths resolve against `data_dir`
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl Config {
    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply environment overrides (data dir)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            tracing::debug!(data_dir = %dir, "Using {} for data directory", DATA_DIR_ENV);
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    /// Resolve a relative `data_dir` against the working directory, so paths
    /// remembered in the settings file stay valid from any later cwd
    pub fn with_absolute_data_dir(mut self) -> Result<Self> {
        self.data_dir = std::path::absolute(&self.data_dir).map_err(|e| {
            Error::Config(format!("data dir {}: {}", self.data_dir.display(), e))
        })?;
        Ok(self)
    }

    /// Endpoint to fall back on when none has been remembered
    pub fn fallback_endpoint(&self) -> String {
        self.default_endpoint
            .clone()
            .unwrap_or_else(|| rpc::endpoint_from_env(self.chain_id))
    }

    /// Resolved audit log location, if auditing is enabled
    pub fn audit_log_file(&self) -> Option<PathBuf> {
        self.audit_log_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.data_dir.join(p)
            }
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_gas_multiplier == 0 {
            return Err(Error::Config(
                "token_gas_multiplier must be at least 1".to_string(),
            ));
        }
        self.kdf.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            chain_id: chains::RINKEBY,
            kdf: KdfCost::default(),
            token_gas_multiplier: 2,
            default_endpoint: None,
            audit_log_path: Some(PathBuf::from("audit.jsonl")),
        }
    }
}
