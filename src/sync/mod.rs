//! Synchronization: filtering, run options, conflict handling, the two-phase
//! sync engine and the bulk one-way backup path.

pub mod bulk;
pub mod conflict;
pub mod engine;
pub mod filter;
pub mod options;

pub use bulk::{BackupReport, ParallelCopier};
pub use conflict::{ConflictInfo, ConflictResolver};
pub use engine::{SyncAction, SyncEngine, SyncReport};
pub use filter::{should_include, PathFilter, Pattern};
pub use options::{CopyOptions, SyncMode, SyncSettings, DEFAULT_CONFLICT_DIR};
