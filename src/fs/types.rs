use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A regular file found while walking a sync root
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the walked root
    pub relative: PathBuf,
    /// Full path on disk
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}
