// Shared fixtures for sync tests
#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use twinsync::hash::{hash_file, Comparator};
use twinsync::history::{HistoryStore, VersionLog};
use twinsync::sync::SyncEngine;

/// A source tree, a target tree and a history root under one temp dir
pub struct Trees {
    pub dir: TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
    pub history: Arc<HistoryStore>,
}

impl Trees {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::in_memory(dir.path().join("history"));
        Self::with_history(dir, history)
    }

    pub fn with_log(log: Box<dyn VersionLog>) -> Self {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::new(dir.path().join("history"), log);
        Self::with_history(dir, history)
    }

    fn with_history(dir: TempDir, history: HistoryStore) -> Self {
        // Canonical roots so paths match what the engine records
        let root = fs::canonicalize(dir.path()).unwrap();
        let source = root.join("source");
        let target = root.join("target");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        history.initialize().unwrap();
        Self {
            dir,
            source,
            target,
            history: Arc::new(history),
        }
    }

    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(Comparator::new(), Arc::clone(&self.history))
    }

    pub fn src(&self, relative: &str) -> PathBuf {
        self.source.join(relative)
    }

    pub fn dst(&self, relative: &str) -> PathBuf {
        self.target.join(relative)
    }

    /// Every record in the history log
    pub fn all_records(&self) -> usize {
        self.history.search("", None, None).len()
    }
}

pub fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn write_at(path: &Path, content: &[u8], mtime: SystemTime) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

pub fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

pub fn hash(path: &Path) -> String {
    hash_file(path).unwrap()
}

/// Regular files under `dir`, recursively
pub fn count_files(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
        .sum()
}
