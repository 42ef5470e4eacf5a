//! Versioned history: an append-only log of superseded file versions, the
//! snapshot tree holding their bytes, and the restore engine built on both.

pub mod log;
pub mod record;
pub mod restore;
pub mod sqlite;
pub mod store;

pub use log::{MemoryVersionLog, VersionFilter, VersionLog};
pub use record::{ChangeType, FileVersionRecord, NewVersion};
pub use restore::{RestoreEngine, RestoreOutcome};
pub use sqlite::SqliteVersionLog;
pub use store::{CleanupReport, HistoryStore};
