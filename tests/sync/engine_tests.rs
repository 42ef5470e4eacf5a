// Tests for the sync engine
// End-to-end runs over real temp directories

use std::fs;
use std::path::PathBuf;

use twinsync::history::{ChangeType, HistoryStore, MemoryVersionLog};
use twinsync::sync::{CopyOptions, PathFilter, SyncAction, SyncSettings};
use twinsync::Error;

use crate::support::{count_files, hash, mtime, secs, t0, write_at, Trees};

#[test]
fn test_identical_pair_is_skipped_without_writes() {
    let trees = Trees::new();
    write_at(&trees.src("a.txt"), b"same bytes", t0());
    write_at(&trees.dst("a.txt"), b"same bytes", t0());

    for settings in [None, Some(SyncSettings::bidirectional())] {
        let report = trees
            .engine()
            .run(&CopyOptions::new(&trees.source, &trees.target), settings.as_ref())
            .unwrap();

        assert_eq!(report.skipped_identical, 1);
        assert_eq!(report.files_synchronized, 0);
        assert_eq!(
            report.actions,
            vec![SyncAction::Skip {
                path: PathBuf::from("a.txt"),
                reason: "identical".to_string()
            }]
        );
    }

    assert_eq!(mtime(&trees.dst("a.txt")), t0());
    assert_eq!(trees.all_records(), 0);
}

#[test]
fn test_missing_target_file_is_created_and_recorded() {
    let trees = Trees::new();
    write_at(&trees.src("b.txt"), b"new file", t0());

    let report = trees
        .engine()
        .run(&CopyOptions::new(&trees.source, &trees.target), None)
        .unwrap();

    assert_eq!(report.files_synchronized, 1);
    assert_eq!(fs::read(trees.dst("b.txt")).unwrap(), b"new file");
    assert_eq!(mtime(&trees.dst("b.txt")), t0());

    let records = trees.history.history(&trees.dst("b.txt"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].change_type, ChangeType::Created);
    assert_eq!(records[0].content_hash, hash(&trees.dst("b.txt")));
    assert!(records[0].history_path.is_none());
}

#[test]
fn test_missing_side_is_created_in_both_directions() {
    let trees = Trees::new();
    write_at(&trees.src("only-source/a.txt"), b"from source", t0());
    write_at(&trees.dst("only-target/b.txt"), b"from target", t0());

    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target),
            Some(&SyncSettings::bidirectional()),
        )
        .unwrap();

    assert_eq!(report.files_synchronized, 2);
    assert_eq!(fs::read(trees.dst("only-source/a.txt")).unwrap(), b"from source");
    assert_eq!(fs::read(trees.src("only-target/b.txt")).unwrap(), b"from target");
    assert!(report.actions.contains(&SyncAction::CopyToTarget {
        path: PathBuf::from("only-source/a.txt")
    }));
    assert!(report.actions.contains(&SyncAction::CopyToSource {
        path: PathBuf::from("only-target/b.txt")
    }));
}

#[test]
fn test_phase_one_copies_are_not_copied_back() {
    let trees = Trees::new();
    write_at(&trees.src("doc.txt"), b"v2", t0() + secs(3600));
    write_at(&trees.dst("doc.txt"), b"v1", t0());

    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target),
            Some(&SyncSettings::bidirectional()),
        )
        .unwrap();

    assert_eq!(report.files_synchronized, 1);
    assert_eq!(
        report.actions,
        vec![SyncAction::CopyToTarget {
            path: PathBuf::from("doc.txt")
        }]
    );
    assert_eq!(fs::read(trees.src("doc.txt")).unwrap(), b"v2");
    assert_eq!(fs::read(trees.dst("doc.txt")).unwrap(), b"v2");
}

#[test]
fn test_overwrite_preserves_previous_target_in_history() {
    let trees = Trees::new();
    write_at(&trees.src("doc.txt"), b"version two", t0() + secs(3600));
    write_at(&trees.dst("doc.txt"), b"version one", t0());

    trees
        .engine()
        .run(&CopyOptions::new(&trees.source, &trees.target), None)
        .unwrap();

    let records = trees.history.history(&trees.dst("doc.txt"));
    assert_eq!(records.len(), 2);

    let snapshot = records
        .iter()
        .find(|r| r.has_snapshot())
        .expect("overwritten file was preserved");
    assert_eq!(snapshot.change_type, ChangeType::Modified);
    let preserved = snapshot.history_path.as_ref().unwrap();
    assert!(preserved.starts_with(trees.history.root()));
    assert_eq!(fs::read(preserved).unwrap(), b"version one");
    assert_eq!(snapshot.content_hash, hash(preserved));
}

#[test]
fn test_failed_copy_leaves_target_in_place() {
    let trees = Trees::new();
    write_at(&trees.src("doc.txt"), b"version two", t0() + secs(3600));
    write_at(&trees.dst("doc.txt"), b"version one", t0());
    write_at(&trees.src("other.txt"), b"other", t0());
    // A directory where the new content would be staged makes the copy fail
    fs::create_dir_all(trees.dst(".doc.txt.twinsync-partial")).unwrap();

    let report = trees
        .engine()
        .run(&CopyOptions::new(&trees.source, &trees.target), None)
        .unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.files_synchronized, 1);
    assert_eq!(fs::read(trees.dst("doc.txt")).unwrap(), b"version one");
    assert!(trees.history.history(&trees.dst("doc.txt")).is_empty());
    assert!(trees.dst(".doc.txt.twinsync-partial").is_dir());
}

#[test]
fn test_second_bidirectional_run_is_a_no_op() {
    let trees = Trees::new();
    write_at(&trees.src("a.txt"), b"a", t0());
    write_at(&trees.src("nested/b.txt"), b"b", t0() + secs(7200));
    write_at(&trees.dst("nested/b.txt"), b"old b", t0());
    write_at(&trees.dst("c.txt"), b"c", t0());
    write_at(&trees.src("d.txt"), b"old d", t0());
    write_at(&trees.dst("d.txt"), b"d", t0() + secs(7200));

    let options = CopyOptions::new(&trees.source, &trees.target);
    let settings = SyncSettings::bidirectional();

    let first = trees.engine().run(&options, Some(&settings)).unwrap();
    assert_eq!(first.files_synchronized, 4);
    assert_eq!(first.errors, 0);

    let records_after_first = trees.all_records();
    let second = trees.engine().run(&options, Some(&settings)).unwrap();

    assert_eq!(second.files_synchronized, 0);
    assert_eq!(second.skipped_identical, 4);
    assert_eq!(second.conflicts_detected, 0);
    assert_eq!(trees.all_records(), records_after_first);
}

#[test]
fn test_dry_run_reports_without_writing() {
    let trees = Trees::new();
    write_at(&trees.src("new.txt"), b"new", t0());
    write_at(&trees.src("changed.txt"), b"v2", t0() + secs(3600));
    write_at(&trees.dst("changed.txt"), b"v1", t0());
    write_at(&trees.dst("back.txt"), b"back", t0());
    write_at(&trees.src("clash.txt"), b"left", t0() + secs(10));
    write_at(&trees.dst("clash.txt"), b"right", t0());

    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target).with_dry_run(true),
            Some(&SyncSettings::bidirectional()),
        )
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.files_synchronized, 3);
    assert_eq!(report.conflicts_detected, 1);
    assert!(report.conflicts.is_empty());

    assert!(!trees.dst("new.txt").exists());
    assert!(!trees.src("back.txt").exists());
    assert_eq!(fs::read(trees.dst("changed.txt")).unwrap(), b"v1");
    assert!(!trees.src(".sync_conflicts").exists());
    assert_eq!(trees.all_records(), 0);
    assert_eq!(count_files(trees.history.root()), 0);
}

#[test]
fn test_dry_run_does_not_create_missing_target() {
    let trees = Trees::new();
    write_at(&trees.src("a.txt"), b"a", t0());
    let target = trees.target.join("not-yet");

    let report = trees
        .engine()
        .run(&CopyOptions::new(&trees.source, &target).with_dry_run(true), None)
        .unwrap();

    assert_eq!(report.files_synchronized, 1);
    assert!(!target.exists());
}

#[test]
fn test_missing_source_root_is_fatal_before_any_change() {
    let trees = Trees::new();
    let missing = trees.source.join("does-not-exist");
    let target = trees.target.join("fresh");

    let err = trees
        .engine()
        .run(
            &CopyOptions::new(&missing, &target),
            Some(&SyncSettings::bidirectional()),
        )
        .unwrap_err();

    assert!(matches!(err, Error::SourceNotFound { .. }));
    assert!(err.is_fatal());
    assert!(!target.exists());
}

#[test]
fn test_missing_target_root_is_created() {
    let trees = Trees::new();
    write_at(&trees.src("a.txt"), b"a", t0());
    let target = trees.target.join("fresh/nested");

    trees
        .engine()
        .run(&CopyOptions::new(&trees.source, &target), None)
        .unwrap();

    assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"a");
}

#[test]
fn test_filter_limits_both_phases() {
    let trees = Trees::new();
    write_at(&trees.src("keep.txt"), b"k", t0());
    write_at(&trees.src("debug.log"), b"l", t0());
    write_at(&trees.dst("remote.log"), b"r", t0());
    write_at(&trees.dst("remote.txt"), b"t", t0());

    let filter = PathFilter::from_patterns(&[] as &[&str], &["*.log"]).unwrap();
    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target).with_filter(filter),
            Some(&SyncSettings::bidirectional()),
        )
        .unwrap();

    assert_eq!(report.files_synchronized, 2);
    assert!(trees.dst("keep.txt").exists());
    assert!(trees.src("remote.txt").exists());
    assert!(!trees.dst("debug.log").exists());
    assert!(!trees.src("remote.log").exists());
}

#[test]
fn test_one_way_deletion_sync_moves_extras_to_history() {
    let trees = Trees::new();
    write_at(&trees.src("kept.txt"), b"kept", t0());
    write_at(&trees.dst("kept.txt"), b"kept", t0());
    write_at(&trees.dst("gone/extra.txt"), b"extra", t0());

    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target).with_delete_extraneous(true),
            None,
        )
        .unwrap();

    assert_eq!(report.files_deleted, 1);
    assert!(!trees.dst("gone/extra.txt").exists());
    assert!(!trees.dst("gone").exists());
    assert!(trees.dst("kept.txt").exists());

    let deleted = trees.history.deleted_files();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].canonical_path, trees.dst("gone/extra.txt"));
    assert_eq!(fs::read(deleted[0].history_path.as_ref().unwrap()).unwrap(), b"extra");
}

#[test]
fn test_deletion_sync_dry_run_keeps_files() {
    let trees = Trees::new();
    write_at(&trees.dst("extra.txt"), b"extra", t0());

    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target)
                .with_delete_extraneous(true)
                .with_dry_run(true),
            None,
        )
        .unwrap();

    assert_eq!(report.files_deleted, 1);
    assert!(trees.dst("extra.txt").exists());
    assert!(trees.history.deleted_files().is_empty());
}

#[test]
fn test_bidirectional_never_deletes() {
    let trees = Trees::new();
    write_at(&trees.dst("extra.txt"), b"extra", t0());

    let report = trees
        .engine()
        .run(
            &CopyOptions::new(&trees.source, &trees.target).with_delete_extraneous(true),
            Some(&SyncSettings::bidirectional()),
        )
        .unwrap();

    assert_eq!(report.files_deleted, 0);
    assert!(trees.dst("extra.txt").exists());
    assert_eq!(fs::read(trees.src("extra.txt")).unwrap(), b"extra");
}

#[test]
fn test_history_root_inside_source_is_not_synchronized() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    let source = root.join("source");
    let target = root.join("target");
    let history = HistoryStore::new(source.join(".history"), Box::new(MemoryVersionLog::new()));
    history.initialize().unwrap();
    let engine = twinsync::sync::SyncEngine::new(
        twinsync::hash::Comparator::new(),
        std::sync::Arc::new(history),
    );

    write_at(&source.join("a.txt"), b"new", t0() + secs(3600));
    write_at(&target.join("a.txt"), b"old", t0());

    engine.run(&CopyOptions::new(&source, &target), None).unwrap();
    // The snapshot of target/a.txt now lives under source/.history
    assert_eq!(count_files(&source.join(".history")), 1);

    let report = engine.run(&CopyOptions::new(&source, &target), None).unwrap();
    assert_eq!(report.files_synchronized, 0);
    assert!(!target.join(".history").exists());
}
