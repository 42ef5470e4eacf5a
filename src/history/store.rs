//! History store: the append-only version log plus the physical snapshot tree.
//!
//! Write-path failures are returned to the caller as `Error::HistoryWrite`.
//! Read-path failures are logged and degrade to an empty result.

use chrono::{DateTime, Duration, Utc};
use jwalk::WalkDir;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::log::{MemoryVersionLog, VersionFilter, VersionLog};
use super::record::{ChangeType, FileVersionRecord, NewVersion};
use super::sqlite::SqliteVersionLog;
use crate::error::{Error, Result};
use crate::fs::LocalFs;
use crate::hash::hash_file;
use crate::logging::{log_error, log_file_operation};

/// Leaf naming prefix of snapshot files: `<yyyyMMdd_HHmmss_fff>_<filename>`
const SNAPSHOT_STAMP: &str = "%Y%m%d_%H%M%S_%3f";

/// Outcome of a retention cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub records_removed: usize,
    pub files_removed: usize,
    pub file_failures: usize,
}

pub struct HistoryStore {
    root: PathBuf,
    log: Box<dyn VersionLog>,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>, log: Box<dyn VersionLog>) -> Self {
        Self {
            root: root.into(),
            log,
        }
    }

    /// Store backed by a SQLite database file
    pub fn open_sqlite(root: impl Into<PathBuf>, database: &Path) -> Result<Self> {
        Ok(Self::new(root, Box::new(SqliteVersionLog::open(database)?)))
    }

    /// Store whose log lives only as long as the process
    pub fn in_memory(root: impl Into<PathBuf>) -> Self {
        Self::new(root, Box::new(MemoryVersionLog::new()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the snapshot root and the log schema
    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| Error::from_io_error(e, "creating history directory", &self.root))?;
        self.log.initialize()
    }

    /// Append a metadata-only record for `path`, hashing it if it still exists
    pub fn track_change(
        &self,
        path: &Path,
        canonical_path: &Path,
        change_type: ChangeType,
        reason: &str,
    ) -> Result<FileVersionRecord> {
        let mut version = NewVersion::new(canonical_path, change_type, reason);
        version.current_path = path.to_path_buf();

        if path.is_file() {
            version.content_hash =
                hash_file(path).map_err(|e| Error::history_write(path, e))?;
            version.file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        }

        let record = self.append(version)?;
        tracing::debug!(
            path = %canonical_path.display(),
            change = %change_type,
            id = record.id,
            "tracked change"
        );
        Ok(record)
    }

    /// Move a live file into the snapshot tree and record where it went.
    ///
    /// If the record cannot be written the file is moved back, so a failed call
    /// leaves neither an unlogged destructive change nor an orphaned snapshot.
    pub fn move_to_history(
        &self,
        path: &Path,
        canonical_path: &Path,
        change_type: ChangeType,
        reason: &str,
    ) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(Error::history_write(path, "file to preserve does not exist"));
        }

        let mut version = NewVersion::new(canonical_path, change_type, reason);
        let snapshot = self.snapshot_path(canonical_path, version.timestamp);

        LocalFs::relocate(path, &snapshot).map_err(|e| Error::history_write(path, e))?;

        let described = hash_file(&snapshot).and_then(|hash| {
            let size = fs::metadata(&snapshot)
                .map_err(|e| Error::from_io_error(e, "reading metadata of", &snapshot))?
                .len();
            Ok((hash, size))
        });
        let appended = described.and_then(|(hash, size)| {
            version.content_hash = hash;
            version.file_size = size;
            version.current_path = snapshot.clone();
            version.history_path = Some(snapshot.clone());
            self.append(version)
        });

        if let Err(e) = appended {
            if let Err(rollback) = LocalFs::relocate(&snapshot, path) {
                log_error(
                    &format!("could not return {} after failed history write", path.display()),
                    Some(&rollback),
                );
            }
            return Err(match e {
                Error::HistoryWrite { .. } => e,
                other => Error::history_write(path, other),
            });
        }

        log_file_operation("snapshot", path, &snapshot);
        Ok(snapshot)
    }

    /// Highest-timestamp non-deleted record for a path
    pub fn latest_version(&self, canonical_path: &Path) -> Option<FileVersionRecord> {
        match self.log.latest(canonical_path) {
            Ok(record) => record,
            Err(e) => {
                warn_read_failure("latest version", &e);
                None
            }
        }
    }

    /// Every record of a path, newest first
    pub fn history(&self, canonical_path: &Path) -> Vec<FileVersionRecord> {
        self.read(&VersionFilter::for_path(canonical_path))
    }

    /// Every deletion record, newest first
    pub fn deleted_files(&self) -> Vec<FileVersionRecord> {
        self.read(&VersionFilter {
            is_deleted: Some(true),
            ..VersionFilter::default()
        })
    }

    /// Records whose path contains `text`, optionally bounded in time
    pub fn search(
        &self,
        text: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<FileVersionRecord> {
        self.read(&VersionFilter {
            path_contains: Some(text.to_string()),
            from,
            to,
            ..VersionFilter::default()
        })
    }

    /// The record a restore of `canonical_path` should use.
    ///
    /// Prefers the newest non-deleted snapshot at or before `as_of`; a deleted
    /// file falls back to its newest deletion snapshot.
    pub fn restore_point(
        &self,
        canonical_path: &Path,
        as_of: Option<DateTime<Utc>>,
    ) -> Option<FileVersionRecord> {
        let base = VersionFilter {
            to: as_of,
            with_snapshot: true,
            limit: Some(1),
            ..VersionFilter::for_path(canonical_path)
        };

        for is_deleted in [false, true] {
            let filter = VersionFilter {
                is_deleted: Some(is_deleted),
                ..base.clone()
            };
            if let Some(record) = self.read(&filter).into_iter().next() {
                return Some(record);
            }
        }
        None
    }

    /// Drop every record older than `retention_days`, deleting its snapshot first.
    ///
    /// Snapshot deletion is best effort: failures are logged and counted, and
    /// the records are removed regardless.
    pub fn cleanup_expired(&self, retention_days: u32) -> Result<CleanupReport> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let expired_filter = VersionFilter {
            before: Some(cutoff),
            ..VersionFilter::default()
        };

        let expired = self.log.query(&expired_filter)?;
        let mut report = CleanupReport::default();

        for record in &expired {
            let Some(ref snapshot) = record.history_path else {
                continue;
            };
            match fs::remove_file(snapshot) {
                Ok(()) => {
                    report.files_removed += 1;
                    if let Some(parent) = snapshot.parent() {
                        LocalFs::prune_empty_dirs(parent, &self.root);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    report.file_failures += 1;
                    log_error(
                        &format!("could not delete expired snapshot {}", snapshot.display()),
                        Some(&e),
                    );
                }
            }
        }

        report.records_removed = self.log.delete(&expired_filter)?;
        tracing::info!(
            retention_days,
            records = report.records_removed,
            files = report.files_removed,
            failures = report.file_failures,
            "history cleanup finished"
        );
        Ok(report)
    }

    /// Snapshot files under the history root that no record points at
    pub fn orphaned_snapshots(&self) -> Vec<PathBuf> {
        let referenced: HashSet<PathBuf> = self
            .read(&VersionFilter {
                with_snapshot: true,
                ..VersionFilter::default()
            })
            .into_iter()
            .filter_map(|r| r.history_path)
            .collect();

        WalkDir::new(&self.root)
            .skip_hidden(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_snapshot_name(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .filter(|path| !referenced.contains(path))
            .collect()
    }

    fn append(&self, version: NewVersion) -> Result<FileVersionRecord> {
        let path = version.canonical_path.clone();
        let version = version
            .normalized()
            .map_err(|reason| Error::history_write(&path, reason))?;
        self.log.append(version).map_err(|e| match e {
            Error::HistoryWrite { .. } => e,
            other => Error::history_write(&path, other),
        })
    }

    fn read(&self, filter: &VersionFilter) -> Vec<FileVersionRecord> {
        self.log.query(filter).unwrap_or_else(|e| {
            warn_read_failure("history query", &e);
            Vec::new()
        })
    }

    /// `<root>/<mirrored parent of canonical>/<stamp>_<filename>`, never reusing a name
    fn snapshot_path(&self, canonical_path: &Path, timestamp: DateTime<Utc>) -> PathBuf {
        let dir = match canonical_path.parent() {
            Some(parent) => self.root.join(LocalFs::mirror_relative(parent)),
            None => self.root.clone(),
        };
        let file_name = canonical_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let stamp = timestamp.format(SNAPSHOT_STAMP).to_string();

        let mut candidate = dir.join(format!("{}_{}", stamp, file_name));
        let mut counter = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{}_{}_{}", stamp, counter, file_name));
            counter += 1;
        }
        candidate
    }
}

fn warn_read_failure(operation: &str, err: &Error) {
    tracing::warn!(error = %err, "{} failed; returning no results", operation);
}

/// Matches the `yyyyMMdd_HHmmss_` prefix written by `snapshot_path`
fn is_snapshot_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 16
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'_'
        && bytes[9..15].iter().all(u8::is_ascii_digit)
        && bytes[15] == b'_'
}
