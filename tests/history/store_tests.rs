// Tests for the history store

use chrono::{Duration, Utc};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use twinsync::hash::{hash_file, Comparator};
use twinsync::history::{ChangeType, HistoryStore, MemoryVersionLog};
use twinsync::sync::{CopyOptions, SyncEngine};
use twinsync::Error;

use crate::support::{canonical_dir, seed_version, FailingLog};

#[test]
fn test_move_to_history_mirrors_canonical_path() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let store = HistoryStore::in_memory(root.join("history"));
    store.initialize().unwrap();
    let file = root.join("projects/app/config.toml");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, b"debug = true").unwrap();
    let expected_hash = hash_file(&file).unwrap();

    let snapshot = store
        .move_to_history(&file, &file, ChangeType::Modified, "overwritten")
        .unwrap();

    assert!(!file.exists());
    assert!(snapshot.starts_with(store.root()));
    assert!(snapshot.parent().unwrap().ends_with("projects/app"));
    assert!(snapshot
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_config.toml"));

    let latest = store.latest_version(&file).unwrap();
    assert_eq!(latest.history_path.as_deref(), Some(snapshot.as_path()));
    assert_eq!(latest.current_path, snapshot);
    assert_eq!(latest.content_hash, expected_hash);
    assert_eq!(latest.file_size, 12);
}

#[test]
fn test_failed_append_moves_file_back() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let store = HistoryStore::new(root.join("history"), Box::new(FailingLog));
    store.initialize().unwrap();
    let file = root.join("precious.txt");
    fs::write(&file, b"do not lose me").unwrap();

    let err = store
        .move_to_history(&file, &file, ChangeType::Modified, "x")
        .unwrap_err();

    assert!(matches!(err, Error::HistoryWrite { .. }));
    assert!(err.is_fatal());
    assert_eq!(fs::read(&file).unwrap(), b"do not lose me");
    assert!(store.orphaned_snapshots().is_empty());
}

#[test]
fn test_sync_aborts_when_history_cannot_be_written() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let (source, target) = (root.join("source"), root.join("target"));
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&target).unwrap();
    fs::write(source.join("a.txt"), b"new").unwrap();
    fs::write(target.join("a.txt"), b"old").unwrap();
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(target.join("a.txt"))
        .unwrap()
        .set_modified(old)
        .unwrap();

    let store = HistoryStore::new(root.join("history"), Box::new(FailingLog));
    let engine = SyncEngine::new(Comparator::new(), Arc::new(store));
    let err = engine
        .run(&CopyOptions::new(&source, &target), None)
        .unwrap_err();

    assert!(matches!(err, Error::HistoryWrite { .. }));
    assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"old");
}

#[test]
fn test_orphaned_snapshots_are_listed() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let store = HistoryStore::in_memory(root.join("history"));
    store.initialize().unwrap();

    let file = root.join("tracked.txt");
    fs::write(&file, b"t").unwrap();
    store
        .move_to_history(&file, &file, ChangeType::Modified, "x")
        .unwrap();
    let stray = store.root().join("20240101_120000_000_stray.txt");
    fs::write(&stray, b"s").unwrap();
    fs::write(store.root().join("history.db"), b"not a snapshot").unwrap();

    assert_eq!(store.orphaned_snapshots(), vec![stray]);
}

#[test]
fn test_cleanup_removes_only_expired_records_and_files() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let history_root = root.join("history");
    let file = root.join("log.txt");
    let now = Utc::now();

    let log = MemoryVersionLog::new();
    let expired = seed_version(
        &log,
        &history_root,
        &file,
        b"old",
        ChangeType::Modified,
        now - Duration::days(40),
    );
    let kept = seed_version(
        &log,
        &history_root,
        &file,
        b"recent",
        ChangeType::Modified,
        now - Duration::days(1),
    );
    let store = HistoryStore::new(&history_root, Box::new(log));
    // A fresh metadata-only record is within the window
    let tracked = store
        .track_change(&file, &file, ChangeType::Deleted, "gone")
        .unwrap();

    let report = store.cleanup_expired(30).unwrap();

    assert_eq!(report.records_removed, 1);
    assert_eq!(report.files_removed, 1);
    assert_eq!(report.file_failures, 0);
    assert!(!expired.history_path.unwrap().exists());
    assert!(kept.history_path.as_ref().unwrap().exists());

    let remaining: Vec<i64> = store.history(&file).iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![tracked.id, kept.id]);
}

#[test]
fn test_cleanup_tolerates_already_missing_snapshot() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let history_root = root.join("history");
    let file = root.join("a.txt");

    let log = MemoryVersionLog::new();
    let record = seed_version(
        &log,
        &history_root,
        &file,
        b"a",
        ChangeType::Modified,
        Utc::now() - Duration::days(10),
    );
    fs::remove_file(record.history_path.unwrap()).unwrap();
    let store = HistoryStore::new(&history_root, Box::new(log));

    let report = store.cleanup_expired(1).unwrap();

    assert_eq!(report.records_removed, 1);
    assert_eq!(report.files_removed, 0);
    assert!(store.history(&file).is_empty());
}

#[test]
fn test_search_by_substring_and_range() {
    let dir = TempDir::new().unwrap();
    let root = canonical_dir(&dir);
    let history_root = root.join("history");
    let now = Utc::now();

    let log = MemoryVersionLog::new();
    let report = root.join("Reports/q1.txt");
    let other = root.join("misc/notes.txt");
    seed_version(&log, &history_root, &report, b"1", ChangeType::Modified, now - Duration::days(5));
    let recent = seed_version(&log, &history_root, &report, b"2", ChangeType::Modified, now - Duration::days(1));
    seed_version(&log, &history_root, &other, b"3", ChangeType::Modified, now - Duration::days(1));
    let store = HistoryStore::new(&history_root, Box::new(log));

    assert_eq!(store.search("reports", None, None).len(), 2);
    let bounded = store.search("REPORTS", Some(now - Duration::days(2)), Some(now));
    assert_eq!(bounded.len(), 1);
    assert_eq!(bounded[0].id, recent.id);
    assert_eq!(store.search("q1", None, None)[0].id, recent.id);
}

#[test]
fn test_read_failures_degrade_to_empty() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(dir.path().join("history"), Box::new(FailingLog));

    assert!(store.latest_version(dir.path()).is_none());
    assert!(store.deleted_files().is_empty());
}
