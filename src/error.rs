// Centralized error handling module
// Every fallible library operation returns twinsync::Result

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for synchronization and history operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source root of a run does not exist; nothing has been touched
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// A single file could not be hashed, copied or moved
    #[error("I/O error while {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A destructive change could not be recorded in the history log
    #[error("Failed to record history for {}: {reason}", path.display())]
    HistoryWrite { path: PathBuf, reason: String },

    #[error("Failed to read history: {0}")]
    HistoryRead(String),

    #[error("History database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Could not start copy workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Create an Io error with context about the operation and the path involved
    pub fn from_io_error(err: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        Error::Io {
            path: path.into(),
            operation: operation.to_string(),
            source: err,
        }
    }

    pub fn history_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::HistoryWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors abort a whole run; everything else is counted per file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SourceNotFound { .. } | Error::HistoryWrite { .. } | Error::Config { .. }
        )
    }
}
