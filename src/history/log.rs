//! Storage-agnostic append-only version log.
//!
//! The log is a multimap from canonical path to version records. Backends
//! only need to support insertion, filtered range queries (newest first) and
//! deletion by filter; records are never updated in place.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::record::{FileVersionRecord, NewVersion};
use crate::error::{Error, Result};

/// Predicate over records, shared by queries and deletions.
///
/// Unset fields do not constrain the match.
#[derive(Debug, Clone, Default)]
pub struct VersionFilter {
    pub canonical_path: Option<PathBuf>,
    /// Case-insensitive substring of the canonical or current path.
    pub path_contains: Option<String>,
    pub is_deleted: Option<bool>,
    /// Inclusive lower bound on the timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the timestamp.
    pub to: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the timestamp.
    pub before: Option<DateTime<Utc>>,
    pub with_snapshot: bool,
    pub limit: Option<usize>,
}

impl VersionFilter {
    pub fn for_path(canonical_path: &Path) -> Self {
        Self {
            canonical_path: Some(canonical_path.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &FileVersionRecord) -> bool {
        if let Some(ref path) = self.canonical_path {
            if &record.canonical_path != path {
                return false;
            }
        }
        if let Some(ref needle) = self.path_contains {
            let needle = needle.to_lowercase();
            let canonical = record.canonical_path.to_string_lossy().to_lowercase();
            let current = record.current_path.to_string_lossy().to_lowercase();
            if !canonical.contains(&needle) && !current.contains(&needle) {
                return false;
            }
        }
        if let Some(deleted) = self.is_deleted {
            if record.is_deleted != deleted {
                return false;
            }
        }
        if self.from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        if self.before.is_some_and(|before| record.timestamp >= before) {
            return false;
        }
        if self.with_snapshot && !record.has_snapshot() {
            return false;
        }
        true
    }
}

/// Backend for the append-only history log.
pub trait VersionLog: Send + Sync {
    /// Create the underlying storage if it does not exist yet.
    fn initialize(&self) -> Result<()>;

    /// Insert a record, assigning it the next id.
    fn append(&self, version: NewVersion) -> Result<FileVersionRecord>;

    /// Matching records, newest first (ties broken by descending id).
    fn query(&self, filter: &VersionFilter) -> Result<Vec<FileVersionRecord>>;

    /// Remove every matching record, returning how many were removed.
    fn delete(&self, filter: &VersionFilter) -> Result<usize>;

    /// Latest non-deleted record for a canonical path.
    fn latest(&self, canonical_path: &Path) -> Result<Option<FileVersionRecord>> {
        let filter = VersionFilter {
            is_deleted: Some(false),
            limit: Some(1),
            ..VersionFilter::for_path(canonical_path)
        };
        Ok(self.query(&filter)?.into_iter().next())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<FileVersionRecord>,
    next_id: i64,
}

/// In-memory log, used by tests and for throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryVersionLog {
    state: Mutex<MemoryState>,
}

impl MemoryVersionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::HistoryRead("in-memory log lock poisoned".to_string()))
    }
}

impl VersionLog for MemoryVersionLog {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn append(&self, version: NewVersion) -> Result<FileVersionRecord> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let record = version.into_record(state.next_id);
        state.records.push(record.clone());
        Ok(record)
    }

    fn query(&self, filter: &VersionFilter) -> Result<Vec<FileVersionRecord>> {
        let state = self.lock()?;
        let mut matches: Vec<FileVersionRecord> = state
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    fn delete(&self, filter: &VersionFilter) -> Result<usize> {
        let mut state = self.lock()?;
        let before = state.records.len();
        state.records.retain(|r| !filter.matches(r));
        Ok(before - state.records.len())
    }
}
