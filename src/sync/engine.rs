//! Sync engine.
//!
//! Walks both roots, applies the path filter, classifies every pair with the
//! comparator and performs the copies. Every overwrite goes through the
//! history store first. A bidirectional run is two strictly sequential
//! phases: source to target, then target to source.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::conflict::{ConflictInfo, ConflictResolver};
use super::options::{CopyOptions, SyncMode, SyncSettings, DEFAULT_CONFLICT_DIR};
use crate::error::{Error, Result};
use crate::fs::{FileEntry, LocalFs};
use crate::hash::{Comparator, Comparison};
use crate::history::{ChangeType, HistoryStore};
use crate::logging::{log_error, log_file_operation};

/// Action taken (or, in a dry run, intended) for one relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    CopyToTarget { path: PathBuf },
    CopyToSource { path: PathBuf },
    DeleteFromTarget { path: PathBuf },
    Skip { path: PathBuf, reason: String },
    Conflict { path: PathBuf },
}

impl SyncAction {
    pub fn path(&self) -> &Path {
        match self {
            Self::CopyToTarget { path }
            | Self::CopyToSource { path }
            | Self::DeleteFromTarget { path }
            | Self::Skip { path, .. }
            | Self::Conflict { path } => path,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Files written (or that would be written, in a dry run).
    pub files_synchronized: usize,
    pub conflicts_detected: usize,
    pub skipped_identical: usize,
    /// Target files moved to history by deletion sync.
    pub files_deleted: usize,
    /// Per-file failures; the walk continued past each of them.
    pub errors: usize,
    pub duration: Duration,
    pub conflicts: Vec<ConflictInfo>,
    pub actions: Vec<SyncAction>,
    pub dry_run: bool,
}

/// Which way a copy flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToTarget,
    ToSource,
}

impl Direction {
    fn action(self, relative: &Path) -> SyncAction {
        let path = relative.to_path_buf();
        match self {
            Direction::ToTarget => SyncAction::CopyToTarget { path },
            Direction::ToSource => SyncAction::CopyToSource { path },
        }
    }
}

/// Resolved roots and per-run collaborators.
struct RunContext<'a> {
    options: &'a CopyOptions,
    source: PathBuf,
    target: PathBuf,
    mode: SyncMode,
    comparator: Comparator,
    resolver: ConflictResolver,
    conflict_dir: PathBuf,
    reserved: Vec<PathBuf>,
}

pub struct SyncEngine {
    comparator: Comparator,
    history: Arc<HistoryStore>,
}

impl SyncEngine {
    pub fn new(comparator: Comparator, history: Arc<HistoryStore>) -> Self {
        Self { comparator, history }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Run one synchronization.
    ///
    /// Without `settings` the run is a one-way copy. Per-file failures are
    /// counted in the report; a missing source root or a history write
    /// failure aborts the run with an error.
    pub fn run(&self, options: &CopyOptions, settings: Option<&SyncSettings>) -> Result<SyncReport> {
        let started = Instant::now();
        let ctx = self.prepare(options, settings)?;

        let mut report = SyncReport {
            dry_run: options.dry_run,
            ..SyncReport::default()
        };

        tracing::info!(
            source = %ctx.source.display(),
            target = %ctx.target.display(),
            mode = ?ctx.mode,
            dry_run = options.dry_run,
            "starting sync"
        );
        tracing::debug!(
            include = ?options.filter.include_patterns().collect::<Vec<_>>(),
            exclude = ?options.filter.exclude_patterns().collect::<Vec<_>>(),
            reserved = ?ctx.reserved,
            "run filter"
        );

        self.phase_source_to_target(&ctx, &mut report)?;

        match ctx.mode {
            SyncMode::Bidirectional => {
                if options.delete_extraneous {
                    tracing::debug!("deletion sync is ignored in bidirectional mode");
                }
                self.phase_target_to_source(&ctx, &mut report)?;
            }
            SyncMode::OneWay if options.delete_extraneous => {
                self.delete_extraneous(&ctx, &mut report)?;
            }
            SyncMode::OneWay => {}
        }

        report.duration = started.elapsed();
        tracing::info!(
            synchronized = report.files_synchronized,
            conflicts = report.conflicts_detected,
            identical = report.skipped_identical,
            deleted = report.files_deleted,
            errors = report.errors,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync finished"
        );
        Ok(report)
    }

    fn prepare<'a>(
        &self,
        options: &'a CopyOptions,
        settings: Option<&SyncSettings>,
    ) -> Result<RunContext<'a>> {
        if !options.source.is_dir() {
            return Err(Error::SourceNotFound {
                path: options.source.clone(),
            });
        }
        let source = fs::canonicalize(&options.source)
            .map_err(|e| Error::from_io_error(e, "resolving", &options.source))?;

        if !options.target.exists() && !options.dry_run {
            fs::create_dir_all(&options.target)
                .map_err(|e| Error::from_io_error(e, "creating target directory", &options.target))?;
        }
        let target = fs::canonicalize(&options.target).unwrap_or_else(|_| options.target.clone());

        let (mode, comparator, conflict_dir_name) = match settings {
            Some(s) => (
                s.mode,
                Comparator::with_conflict_window(s.conflict_window),
                s.conflict_dir.clone(),
            ),
            None => (
                SyncMode::OneWay,
                self.comparator,
                DEFAULT_CONFLICT_DIR.to_string(),
            ),
        };

        let conflict_dir = source.join(&conflict_dir_name);
        let history_root = fs::canonicalize(self.history.root())
            .unwrap_or_else(|_| self.history.root().to_path_buf());
        let reserved = vec![conflict_dir.clone(), target.join(&conflict_dir_name), history_root];

        Ok(RunContext {
            options,
            source,
            target,
            mode,
            comparator,
            resolver: ConflictResolver::new(comparator),
            conflict_dir,
            reserved,
        })
    }

    /// Phase 1: every included source file against its target counterpart.
    fn phase_source_to_target(&self, ctx: &RunContext<'_>, report: &mut SyncReport) -> Result<()> {
        for entry in walk(ctx, &ctx.source, report) {
            let target = ctx.target.join(&entry.relative);
            let outcome = self.sync_from_source(ctx, &entry, &target, report);
            settle(outcome, &entry.path, report)?;
        }
        Ok(())
    }

    /// Phase 2: every included target file that is newer than (or missing
    /// from) the source. Conflicts and identical pairs were settled in phase 1.
    fn phase_target_to_source(&self, ctx: &RunContext<'_>, report: &mut SyncReport) -> Result<()> {
        for entry in walk(ctx, &ctx.target, report) {
            let source = ctx.source.join(&entry.relative);
            let outcome = ctx
                .comparator
                .compare(&source, &entry.path)
                .and_then(|cmp| {
                    if cmp.target_newer && !cmp.has_conflict {
                        self.copy_over(ctx, Direction::ToSource, &entry.path, &source, &entry.relative, report)
                    } else {
                        Ok(())
                    }
                });
            settle(outcome, &entry.path, report)?;
        }
        Ok(())
    }

    fn sync_from_source(
        &self,
        ctx: &RunContext<'_>,
        entry: &FileEntry,
        target: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        let cmp = ctx.comparator.compare(&entry.path, target)?;

        if cmp.identical {
            report.skipped_identical += 1;
            report.actions.push(SyncAction::Skip {
                path: entry.relative.clone(),
                reason: "identical".to_string(),
            });
            return Ok(());
        }

        match ctx.mode {
            // The target is subordinate: anything that differs is overwritten
            SyncMode::OneWay => {
                self.copy_over(ctx, Direction::ToTarget, &entry.path, target, &entry.relative, report)
            }
            SyncMode::Bidirectional if cmp.has_conflict => {
                self.record_conflict(ctx, entry, target, &cmp, report)
            }
            SyncMode::Bidirectional if cmp.source_newer => {
                self.copy_over(ctx, Direction::ToTarget, &entry.path, target, &entry.relative, report)
            }
            SyncMode::Bidirectional => Ok(()),
        }
    }

    fn record_conflict(
        &self,
        ctx: &RunContext<'_>,
        entry: &FileEntry,
        target: &Path,
        cmp: &Comparison,
        report: &mut SyncReport,
    ) -> Result<()> {
        report.actions.push(SyncAction::Conflict {
            path: entry.relative.clone(),
        });

        if ctx.options.dry_run {
            tracing::info!(
                dry_run = true,
                path = %entry.relative.display(),
                source_modified = ?cmp.source_modified,
                target_modified = ?cmp.target_modified,
                "would back up conflicting file"
            );
        } else {
            let info = ctx.resolver.resolve(&entry.path, target, &ctx.conflict_dir)?;
            report.conflicts.push(info);
        }
        report.conflicts_detected += 1;
        Ok(())
    }

    /// Copy `from` over `to`, preserving the replaced file in history first.
    fn copy_over(
        &self,
        ctx: &RunContext<'_>,
        direction: Direction,
        from: &Path,
        to: &Path,
        relative: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        report.actions.push(direction.action(relative));

        if ctx.options.dry_run {
            tracing::info!(
                dry_run = true,
                from = %from.display(),
                to = %to.display(),
                "would copy"
            );
            report.files_synchronized += 1;
            return Ok(());
        }

        let replacing = to.is_file();
        if !replacing {
            LocalFs::copy_file(from, to)?;
        } else {
            // The live file is only snapshotted once the new content is on disk
            let staged = staging_path(to);
            if let Err(e) = LocalFs::copy_file(from, &staged) {
                discard(&staged);
                return Err(e);
            }
            let snapshot = match self.history.move_to_history(
                to,
                to,
                ChangeType::Modified,
                &format!("Overwritten by sync from {}", from.display()),
            ) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    discard(&staged);
                    return Err(e);
                }
            };
            if let Err(e) = LocalFs::relocate(&staged, to) {
                discard(&staged);
                if let Err(rollback) = LocalFs::relocate(&snapshot, to) {
                    log_error(
                        &format!("could not return {} after failed copy", to.display()),
                        Some(&rollback),
                    );
                }
                return Err(e);
            }
        }
        log_file_operation("copy", from, to);

        let change = if replacing {
            ChangeType::Modified
        } else {
            ChangeType::Created
        };
        self.history
            .track_change(to, to, change, &format!("Synchronized from {}", from.display()))?;

        report.files_synchronized += 1;
        Ok(())
    }

    /// One-way deletion sync: target files with no source counterpart go to history.
    fn delete_extraneous(&self, ctx: &RunContext<'_>, report: &mut SyncReport) -> Result<()> {
        for entry in walk(ctx, &ctx.target, report) {
            if ctx.source.join(&entry.relative).exists() {
                continue;
            }
            report.actions.push(SyncAction::DeleteFromTarget {
                path: entry.relative.clone(),
            });

            if ctx.options.dry_run {
                tracing::info!(dry_run = true, path = %entry.path.display(), "would delete");
                report.files_deleted += 1;
                continue;
            }

            let moved = self
                .history
                .move_to_history(&entry.path, &entry.path, ChangeType::Deleted, "Removed from source")
                .map(|snapshot| {
                    log_file_operation("delete", &entry.path, &snapshot);
                    if let Some(parent) = entry.path.parent() {
                        LocalFs::prune_empty_dirs(parent, &ctx.target);
                    }
                });
            if moved.is_ok() {
                report.files_deleted += 1;
            }
            settle(moved, &entry.path, report)?;
        }
        Ok(())
    }
}

/// Walk `root` under the run's reserved dirs and filter; walk errors are counted.
fn walk(ctx: &RunContext<'_>, root: &Path, report: &mut SyncReport) -> Vec<FileEntry> {
    if !root.is_dir() {
        return Vec::new();
    }
    let (files, errors) = LocalFs::walk_files(root, &ctx.reserved);
    for err in errors {
        report.errors += 1;
        log_error("could not read entry during walk", Some(&err));
    }
    files
        .into_iter()
        .filter(|entry| ctx.options.filter.should_include(&entry.relative))
        .collect()
}

/// Count a per-file failure, or pass a fatal one up.
fn settle(outcome: Result<()>, path: &Path, report: &mut SyncReport) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            log_error(&format!("sync aborted at {}", path.display()), Some(&e));
            Err(e)
        }
        Err(e) => {
            report.errors += 1;
            log_error(&format!("failed to sync {}", path.display()), Some(&e));
            Ok(())
        }
    }
}

/// Sibling of `to` that receives new content before it replaces `to`
fn staging_path(to: &Path) -> PathBuf {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    to.with_file_name(format!(".{}.twinsync-partial", name))
}

fn discard(staged: &Path) {
    if staged.is_file() {
        if let Err(e) = fs::remove_file(staged) {
            log_error(
                &format!("could not remove staged copy {}", staged.display()),
                Some(&Error::from_io_error(e, "removing", staged)),
            );
        }
    }
}
