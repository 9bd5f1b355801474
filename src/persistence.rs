//! Session settings that survive restarts
//!
//! A small JSON document in the data directory remembers the node endpoint
//! and the location of the keystore file, so a returning user can unlock
//! without importing again. Writes go to a sibling file first and are renamed
//! into place.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "session.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Node endpoint URL; empty when none is remembered
    #[serde(default)]
    pub node_endpoint: String,
    /// Encrypted key file of the imported account
    #[serde(default)]
    pub keystore_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields defaults
    pub fn load(&self) -> Result<SessionSettings> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::PersistenceFailure(format!("parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionSettings::default()),
            Err(e) => Err(Error::PersistenceFailure(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub fn save(&self, settings: &SessionSettings) -> Result<()> {
        let io_err =
            |e: std::io::Error| Error::PersistenceFailure(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(settings)
            .map_err(|e| Error::PersistenceFailure(e.to_string()))?;

        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json).map_err(io_err)?;
        std::fs::rename(&staging, &self.path).map_err(io_err)?;
        Ok(())
    }

    pub fn set_endpoint(&self, url: &str) -> Result<()> {
        let mut settings = self.load()?;
        settings.node_endpoint = url.to_string();
        self.save(&settings)
    }

    pub fn clear_endpoint(&self) -> Result<()> {
        self.set_endpoint("")
    }

    /// Forget everything
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::PersistenceFailure(format!(
                "remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
