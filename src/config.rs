use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::pagination::PageLimits;
use crate::{flog_debug, Error, Result};

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn max_page_size() -> usize {
    MAX_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Location of the file-backed store used by the CLI.
    pub store_path: Option<String>,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "max_page_size")]
    pub max_page_size: usize,
    /// Minimum level written to the log file (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            log_level: None,
        }
    }
}

impl Config {
    pub fn fedflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".fedflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::fedflow_dir()?.join("fedflow.toml"))
    }

    pub fn effective_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(Self::fedflow_dir()?.join("store.json")),
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits::new(self.default_page_size, self.max_page_size)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_toml(&fs::read_to_string(&path)?)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        if config.default_page_size == 0 || config.max_page_size == 0 {
            return Err(Error::invalid_input(
                "config",
                "page sizes must be greater than zero",
            ));
        }
        if config.default_page_size > config.max_page_size {
            return Err(Error::invalid_input(
                "config",
                "default_page_size exceeds max_page_size",
            ));
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::fedflow_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
