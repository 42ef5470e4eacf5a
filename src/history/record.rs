//! Version records stored in the history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Maximum stored length of any path column.
pub const MAX_PATH_LEN: usize = 500;
/// Maximum stored length of the reason column.
pub const MAX_REASON_LEN: usize = 100;

/// Kind of destructive (or creative) event a record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
    Moved,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
            Self::Renamed => "Renamed",
            Self::Moved => "Moved",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Modified" => Ok(Self::Modified),
            "Deleted" => Ok(Self::Deleted),
            "Renamed" => Ok(Self::Renamed),
            "Moved" => Ok(Self::Moved),
            other => Err(format!("unknown change type '{}'", other)),
        }
    }
}

/// One immutable entry of the append-only history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersionRecord {
    pub id: i64,
    /// The stable location this record is about.
    pub canonical_path: PathBuf,
    /// Where the bytes lived when the record was written.
    pub current_path: PathBuf,
    /// Hex SHA-256 of the content, empty when the file was already gone.
    pub content_hash: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    /// Preserved bytes, `None` for metadata-only records.
    pub history_path: Option<PathBuf>,
    pub file_size: u64,
    pub reason: String,
    pub is_deleted: bool,
}

impl FileVersionRecord {
    pub fn has_snapshot(&self) -> bool {
        self.history_path.is_some()
    }
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub canonical_path: PathBuf,
    pub current_path: PathBuf,
    pub content_hash: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    pub history_path: Option<PathBuf>,
    pub file_size: u64,
    pub reason: String,
}

impl NewVersion {
    /// Start a record for `canonical_path` stamped with the current time.
    pub fn new(canonical_path: &Path, change_type: ChangeType, reason: &str) -> Self {
        Self {
            canonical_path: canonical_path.to_path_buf(),
            current_path: canonical_path.to_path_buf(),
            content_hash: String::new(),
            change_type,
            timestamp: now_micros(),
            history_path: None,
            file_size: 0,
            reason: reason.to_string(),
        }
    }

    /// Enforce the column limits of the log schema.
    ///
    /// Oversized paths are rejected (a truncated path would point somewhere
    /// else); an oversized reason is cut to fit.
    pub fn normalized(mut self) -> Result<Self, String> {
        for (column, path) in [
            ("canonical path", Some(&self.canonical_path)),
            ("current path", Some(&self.current_path)),
            ("history path", self.history_path.as_ref()),
        ] {
            if let Some(path) = path {
                let len = path.to_string_lossy().chars().count();
                if len > MAX_PATH_LEN {
                    return Err(format!(
                        "{} is {} characters long (limit {})",
                        column, len, MAX_PATH_LEN
                    ));
                }
            }
        }
        if self.reason.chars().count() > MAX_REASON_LEN {
            self.reason = self.reason.chars().take(MAX_REASON_LEN).collect();
        }
        self.timestamp = truncate_micros(self.timestamp);
        Ok(self)
    }

    pub fn into_record(self, id: i64) -> FileVersionRecord {
        FileVersionRecord {
            id,
            is_deleted: self.change_type == ChangeType::Deleted,
            canonical_path: self.canonical_path,
            current_path: self.current_path,
            content_hash: self.content_hash,
            change_type: self.change_type,
            timestamp: self.timestamp,
            history_path: self.history_path,
            file_size: self.file_size,
            reason: self.reason,
        }
    }
}

/// Current time at the precision both log backends store.
pub fn now_micros() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}
