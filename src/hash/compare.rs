// Compare engine module
// Classifies a (source, target) file pair by modification time, size and content hash

use chrono::{DateTime, Utc};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use super::hash::hash_file;
use crate::error::{Error, Result};

/// Two divergent copies modified closer together than this are treated as a conflict.
///
/// Without a stored per-path baseline this is only a heuristic for "both sides
/// changed since the last sync".
pub const CONFLICT_WINDOW: Duration = Duration::from_secs(60);

/// Result of comparing one file pair
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Comparison {
    pub identical: bool,
    pub source_newer: bool,
    pub target_newer: bool,
    pub has_conflict: bool,
    pub source_hash: Option<String>,
    pub target_hash: Option<String>,
    pub source_modified: Option<DateTime<Utc>>,
    pub target_modified: Option<DateTime<Utc>>,
}

/// Compares file pairs
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    conflict_window: Duration,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator {
    pub fn new() -> Self {
        Self {
            conflict_window: CONFLICT_WINDOW,
        }
    }

    pub fn with_conflict_window(conflict_window: Duration) -> Self {
        Self { conflict_window }
    }

    /// Compare `source` against `target`.
    ///
    /// A side that does not exist is never identical to the other one, and the
    /// existing side is always reported as newer. Equal modification times fall
    /// back to size and then content hash. Unreadable files surface as
    /// `Error::Io` for the caller to count.
    pub fn compare(&self, source: &Path, target: &Path) -> Result<Comparison> {
        let source_meta = stat(source)?;
        let target_meta = stat(target)?;

        let (source_meta, target_meta) = match (source_meta, target_meta) {
            (Some(s), Some(t)) => (s, t),
            (Some(s), None) => {
                return Ok(Comparison {
                    source_newer: true,
                    source_modified: modified_utc(&s),
                    ..Comparison::default()
                })
            }
            (None, Some(t)) => {
                return Ok(Comparison {
                    target_newer: true,
                    target_modified: modified_utc(&t),
                    ..Comparison::default()
                })
            }
            (None, None) => return Ok(Comparison::default()),
        };

        let source_time = modified(&source_meta, source)?;
        let target_time = modified(&target_meta, target)?;

        let mut result = Comparison {
            source_modified: Some(source_time.into()),
            target_modified: Some(target_time.into()),
            ..Comparison::default()
        };

        if source_time == target_time {
            // Same timestamp, different bytes: both sides were edited
            if source_meta.len() != target_meta.len() {
                result.has_conflict = true;
                return Ok(result);
            }
            let source_hash = hash_file(source)?;
            let target_hash = hash_file(target)?;
            result.identical = source_hash == target_hash;
            result.has_conflict = !result.identical;
            result.source_hash = Some(source_hash);
            result.target_hash = Some(target_hash);
            return Ok(result);
        }

        result.source_newer = source_time > target_time;
        result.target_newer = !result.source_newer;

        if time_distance(source_time, target_time) < self.conflict_window {
            let source_hash = hash_file(source)?;
            let target_hash = hash_file(target)?;
            result.has_conflict = source_hash != target_hash;
            result.source_hash = Some(source_hash);
            result.target_hash = Some(target_hash);
        }

        Ok(result)
    }
}

fn stat(path: &Path) -> Result<Option<Metadata>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta)),
        Ok(_) => Err(Error::from_io_error(
            io::Error::new(io::ErrorKind::Other, "not a regular file"),
            "comparing",
            path,
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::from_io_error(e, "reading metadata of", path)),
    }
}

fn modified(meta: &Metadata, path: &Path) -> Result<SystemTime> {
    meta.modified()
        .map_err(|e| Error::from_io_error(e, "reading modification time of", path))
}

fn modified_utc(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn time_distance(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b)
        .or_else(|_| b.duration_since(a))
        .unwrap_or_default()
}
