//! Conflict handling for bidirectional sync.
//!
//! A conflict is never merged and no side is picked: the copy that would have
//! been overwritten is backed up under a timestamped name, both originals are
//! left as they are, and the event is returned to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs::LocalFs;
use crate::hash::{hash_file, Comparator};
use crate::logging::log_file_operation;

/// Backup leaf naming prefix: `<yyyyMMdd_HHmmss>_<filename>`
const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";

/// A detected conflict, reported in the run result and then discarded.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictInfo {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub source_modified: Option<DateTime<Utc>>,
    pub target_modified: Option<DateTime<Utc>>,
    pub source_hash: Option<String>,
    pub target_hash: Option<String>,
    /// Preserved copy of the version that would have lost.
    pub backup_path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

/// Backs up the losing side of a conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    comparator: Comparator,
}

impl ConflictResolver {
    pub fn new(comparator: Comparator) -> Self {
        Self { comparator }
    }

    /// Preserve the side that would have been overwritten into `backup_dir`.
    pub fn resolve(&self, source: &Path, target: &Path, backup_dir: &Path) -> Result<ConflictInfo> {
        let comparison = self.comparator.compare(source, target)?;
        let detected_at = Utc::now();

        // The older side is the one a copy would overwrite
        let losing = if comparison.target_newer { source } else { target };
        let backup_path = backup_path(backup_dir, losing, detected_at);
        LocalFs::copy_file(losing, &backup_path)?;
        log_file_operation("conflict-backup", losing, &backup_path);

        tracing::warn!(
            source = %source.display(),
            target = %target.display(),
            backup = %backup_path.display(),
            "conflict detected; both copies kept"
        );

        Ok(ConflictInfo {
            source_path: source.to_path_buf(),
            target_path: target.to_path_buf(),
            source_modified: comparison.source_modified,
            target_modified: comparison.target_modified,
            source_hash: hash_or_compute(comparison.source_hash, source)?,
            target_hash: hash_or_compute(comparison.target_hash, target)?,
            backup_path,
            detected_at,
        })
    }
}

/// The comparator skips hashing when sizes already differ
fn hash_or_compute(known: Option<String>, path: &Path) -> Result<Option<String>> {
    match known {
        Some(hash) => Ok(Some(hash)),
        None => hash_file(path).map(Some),
    }
}

fn backup_path(backup_dir: &Path, losing: &Path, at: DateTime<Utc>) -> PathBuf {
    let name = losing
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let stamp = at.format(BACKUP_STAMP);

    let mut candidate = backup_dir.join(format!("{}_{}", stamp, name));
    let mut counter = 1;
    while candidate.exists() {
        candidate = backup_dir.join(format!("{}_{}_{}", stamp, counter, name));
        counter += 1;
    }
    candidate
}
