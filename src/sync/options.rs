//! Run options.
//!
//! A run is described by a base `CopyOptions` plus an optional `SyncSettings`.
//! Without settings a run is a plain one-way copy.

use std::path::PathBuf;
use std::time::Duration;

use super::filter::PathFilter;
use crate::hash::CONFLICT_WINDOW;

/// Default name of the conflict backup directory inside the source root.
pub const DEFAULT_CONFLICT_DIR: &str = ".sync_conflicts";

/// Sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Source -> target only; the target is subordinate.
    #[default]
    OneWay,
    /// Source -> target, then target -> source.
    Bidirectional,
}

/// What to copy and how.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub filter: PathFilter,
    /// Classify and report only; nothing is written.
    pub dry_run: bool,
    /// One-way only: move target files missing from the source into history.
    pub delete_extraneous: bool,
}

impl CopyOptions {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            filter: PathFilter::new(),
            dry_run: false,
            delete_extraneous: false,
        }
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_delete_extraneous(mut self, delete: bool) -> Self {
        self.delete_extraneous = delete;
        self
    }
}

/// Sync-specific settings layered on top of `CopyOptions`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub mode: SyncMode,
    /// Directory under the source root that receives conflict backups.
    pub conflict_dir: String,
    pub conflict_window: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::Bidirectional,
            conflict_dir: DEFAULT_CONFLICT_DIR.to_string(),
            conflict_window: CONFLICT_WINDOW,
        }
    }
}

impl SyncSettings {
    pub fn bidirectional() -> Self {
        Self::default()
    }

    pub fn one_way() -> Self {
        Self {
            mode: SyncMode::OneWay,
            ..Self::default()
        }
    }

    pub fn with_conflict_dir(mut self, dir: impl Into<String>) -> Self {
        self.conflict_dir = dir.into();
        self
    }
}
