//! Installer configuration - YAML file with CLI overrides on top

use crate::core::DEFAULT_MAX_RETRIES;
use crate::error::Result;
use crate::installer::MAX_WORKERS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "swiftinstall/config.yml";

/// Settings read from `config.yml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub max_workers: usize,
    pub parallel: bool,
    pub stop_on_error: bool,
    pub max_retries: u32,
    pub non_interactive: bool,
    /// env_logger filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Where hot-refresh writes the sourceable environment snippet
    pub profile_path: Option<PathBuf>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            max_workers: MAX_WORKERS,
            parallel: true,
            stop_on_error: false,
            max_retries: DEFAULT_MAX_RETRIES,
            non_interactive: true,
            log_level: "info".to_string(),
            profile_path: None,
        }
    }
}

impl InstallerConfig {
    /// `<config dir>/swiftinstall/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: InstallerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path`, or the default location when `None`. A missing file
    /// yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::from_file(&path)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
