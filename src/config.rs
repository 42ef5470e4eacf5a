//! Configuration loading
//!
//! Reads `config.toml` from `--config` or from `<config dir>/twinsync/`.
//! Every key is optional; command-line flags override what is loaded here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::sync::{PathFilter, DEFAULT_CONFLICT_DIR};

const APP_DIR: &str = "twinsync";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "history.db";

pub const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the snapshot tree
    pub history_dir: PathBuf,
    /// SQLite log; `<history_dir>/history.db` when unset
    pub database: Option<PathBuf>,
    pub retention_days: u32,
    /// Conflict backup directory, relative to the source root
    pub conflict_dir: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Worker count for bulk backups
    pub parallelism: usize,
}

impl Default for Config {
    fn default() -> Self {
        let history_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("history");

        Self {
            history_dir,
            database: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            conflict_dir: DEFAULT_CONFLICT_DIR.to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
            parallelism: num_cpus::get(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, origin: &Path) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        if config.conflict_dir.trim().is_empty() {
            return Err(Error::Config {
                path: origin.to_path_buf(),
                reason: "conflict_dir must not be empty".to_string(),
            });
        }
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.history_dir.join(DATABASE_FILE))
    }

    /// Configured patterns first, then `extra_include` / `extra_exclude`
    pub fn filter(&self, extra_include: &[String], extra_exclude: &[String]) -> Result<PathFilter> {
        let include: Vec<&String> = self.include.iter().chain(extra_include).collect();
        let exclude: Vec<&String> = self.exclude.iter().chain(extra_exclude).collect();
        PathFilter::from_patterns(&include, &exclude)
    }
}

/// `<config dir>/twinsync/config.toml`, if the platform has a config dir
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
