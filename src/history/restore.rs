//! Restore engine: writes a preserved snapshot back to its canonical location.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::record::{ChangeType, FileVersionRecord};
use super::store::HistoryStore;
use crate::fs::LocalFs;
use crate::hash::hash_file;
use crate::logging::{log_error, log_file_operation};

/// Structured result of a restore; failures are reported here, not thrown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreOutcome {
    pub success: bool,
    pub restored_path: Option<PathBuf>,
    pub source_history_path: Option<PathBuf>,
    pub message: String,
    pub errors: Vec<String>,
}

impl RestoreOutcome {
    fn failed(message: String) -> Self {
        Self {
            errors: vec![message.clone()],
            message,
            ..Self::default()
        }
    }
}

pub struct RestoreEngine {
    history: Arc<HistoryStore>,
}

impl RestoreEngine {
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self { history }
    }

    /// Restore `canonical_path` from its newest snapshot, or from the newest one
    /// taken at or before `as_of`.
    ///
    /// The restore itself is appended to the log as a `Created` record. A live
    /// file with different content at the destination is preserved first.
    pub fn restore(&self, canonical_path: &Path, as_of: Option<DateTime<Utc>>) -> RestoreOutcome {
        let Some(record) = self.history.restore_point(canonical_path, as_of) else {
            let when = as_of
                .map(|t| format!(" at or before {}", t.to_rfc3339()))
                .unwrap_or_default();
            return RestoreOutcome::failed(format!(
                "No restorable version of {}{}",
                canonical_path.display(),
                when
            ));
        };

        let Some(snapshot) = record.history_path.clone() else {
            return RestoreOutcome::failed(format!(
                "Record {} for {} has no snapshot",
                record.id,
                canonical_path.display()
            ));
        };
        if !snapshot.is_file() {
            return RestoreOutcome::failed(format!(
                "Snapshot {} for {} no longer exists",
                snapshot.display(),
                canonical_path.display()
            ));
        }

        let mut outcome = RestoreOutcome {
            source_history_path: Some(snapshot.clone()),
            ..RestoreOutcome::default()
        };

        if let Err(e) = self.preserve_current(canonical_path, &record) {
            log_error("restore aborted: current file could not be preserved", Some(&e));
            outcome.message = format!("Could not preserve current {}", canonical_path.display());
            outcome.errors.push(e.to_string());
            return outcome;
        }

        if let Err(e) = LocalFs::copy_file(&snapshot, canonical_path) {
            log_error("restore copy failed", Some(&e));
            outcome.message = format!("Could not write {}", canonical_path.display());
            outcome.errors.push(e.to_string());
            return outcome;
        }
        log_file_operation("restore", &snapshot, canonical_path);
        outcome.restored_path = Some(canonical_path.to_path_buf());

        let reason = format!("Restored from version {}", record.id);
        match self
            .history
            .track_change(canonical_path, canonical_path, ChangeType::Created, &reason)
        {
            Ok(_) => {
                outcome.success = true;
                outcome.message = format!(
                    "Restored {} from {}",
                    canonical_path.display(),
                    record.timestamp.to_rfc3339()
                );
            }
            Err(e) => {
                log_error("restored file could not be recorded", Some(&e));
                outcome.message = format!(
                    "Restored {} but the restore was not recorded",
                    canonical_path.display()
                );
                outcome.errors.push(e.to_string());
            }
        }

        outcome
    }

    pub fn list_deleted(&self) -> Vec<FileVersionRecord> {
        self.history.deleted_files()
    }

    pub fn list_history(&self, canonical_path: &Path) -> Vec<FileVersionRecord> {
        self.history.history(canonical_path)
    }

    /// Move the live destination into history unless it already holds the snapshot's bytes
    fn preserve_current(&self, canonical_path: &Path, record: &FileVersionRecord) -> crate::Result<()> {
        if !canonical_path.is_file() {
            return Ok(());
        }
        if hash_file(canonical_path)? == record.content_hash {
            return Ok(());
        }
        self.history
            .move_to_history(
                canonical_path,
                canonical_path,
                ChangeType::Modified,
                "Replaced by restore",
            )
            .map(|_| ())
    }
}
