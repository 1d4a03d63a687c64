//! Persisted user configuration: the remote service credential.

use crate::constants::{APP_NAME, CONFIG_FILE_NAME};
use crate::error::{Result, SqueezeError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// On-disk record, `{"apiKey": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// A JSON config file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<platform config dir>/squeeze-dir/config.json`.
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", APP_NAME).ok_or_else(|| {
            SqueezeError::Config("cannot determine the user config directory".to_string())
        })?;
        Ok(Self::at(dirs.config_dir().join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty config.
    pub fn load(&self) -> Result<StoredConfig> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StoredConfig::default()),
            Err(err) => return Err(self.config_err(err)),
        };

        serde_json::from_str(&contents).map_err(|e| self.config_err(e))
    }

    /// Writes the record through a temp file and a rename, so readers never
    /// observe a half-written config.
    pub fn save(&self, config: &StoredConfig) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| self.config_err(e))?;

        let json = serde_json::to_string_pretty(config).map_err(|e| self.config_err(e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.config_err(e))?;
        file.write_all(json.as_bytes()).map_err(|e| self.config_err(e))?;
        file.write_all(b"\n").map_err(|e| self.config_err(e))?;
        file.as_file().sync_all().map_err(|e| self.config_err(e))?;
        file.persist(&self.path).map_err(|e| self.config_err(e.error))?;

        tracing::debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SqueezeError::Config("API key must not be empty".to_string()));
        }

        let mut config = self.load()?;
        config.api_key = Some(key.to_string());
        self.save(&config)
    }

    fn config_err(&self, err: impl std::fmt::Display) -> SqueezeError {
        SqueezeError::Config(format!("{}: {}", self.path.display(), err))
    }
}
