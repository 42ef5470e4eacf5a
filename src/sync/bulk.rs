//! Bulk one-way backup.
//!
//! Copies every included source file that is missing or older on the target
//! across a bounded rayon pool. Fresh backups only ever replace older copies,
//! so nothing here goes through history.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::options::CopyOptions;
use crate::error::{Error, Result};
use crate::fs::{FileEntry, LocalFs};
use crate::logging::{log_error, log_file_operation};

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupReport {
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub files_up_to_date: usize,
    pub errors: usize,
    pub duration: Duration,
    pub dry_run: bool,
}

/// Files and bytes completed so far, shared by every worker.
#[derive(Debug, Default)]
struct Progress {
    files: usize,
    bytes: u64,
}

pub struct ParallelCopier {
    parallelism: usize,
    show_progress: bool,
}

impl ParallelCopier {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn run(&self, options: &CopyOptions) -> Result<BackupReport> {
        let started = Instant::now();
        if !options.source.is_dir() {
            return Err(Error::SourceNotFound {
                path: options.source.clone(),
            });
        }

        let (files, walk_errors) = LocalFs::walk_files(&options.source, &[]);
        let mut report = BackupReport {
            dry_run: options.dry_run,
            errors: walk_errors.len(),
            ..BackupReport::default()
        };
        for err in &walk_errors {
            log_error("could not read entry during backup walk", Some(err));
        }

        let included: Vec<FileEntry> = files
            .into_iter()
            .filter(|entry| options.filter.should_include(&entry.relative))
            .collect();
        let total = included.len();
        let pending: Vec<FileEntry> = included
            .into_iter()
            .filter(|entry| needs_copy(entry, &options.target.join(&entry.relative)))
            .collect();
        report.files_up_to_date = total - pending.len();

        if options.dry_run {
            for entry in &pending {
                tracing::info!(dry_run = true, path = %entry.relative.display(), "would back up");
            }
            report.files_copied = pending.len();
            report.bytes_copied = pending.iter().map(|e| e.size).sum();
            report.duration = started.elapsed();
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .build()?;

        let progress = Mutex::new(Progress::default());
        let bar = self.progress_bar(pending.len() as u64);

        let failures: usize = pool.install(|| {
            pending
                .par_iter()
                .map(|entry| {
                    let destination = options.target.join(&entry.relative);
                    let result = LocalFs::copy_file(&entry.path, &destination);
                    if let Some(ref bar) = bar {
                        bar.inc(1);
                    }
                    match result {
                        Ok(bytes) => {
                            log_file_operation("backup", &entry.path, &destination);
                            let mut done = progress.lock().unwrap_or_else(|e| e.into_inner());
                            done.files += 1;
                            done.bytes += bytes;
                            0
                        }
                        Err(e) => {
                            log_error(&format!("backup of {} failed", entry.path.display()), Some(&e));
                            1
                        }
                    }
                })
                .sum()
        });

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        let done = progress.into_inner().unwrap_or_else(|e| e.into_inner());
        report.files_copied = done.files;
        report.bytes_copied = done.bytes;
        report.errors += failures;
        report.duration = started.elapsed();

        tracing::info!(
            copied = report.files_copied,
            bytes = report.bytes_copied,
            errors = report.errors,
            workers = self.parallelism,
            "backup finished"
        );
        Ok(report)
    }

    fn progress_bar(&self, len: u64) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%)")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Some(bar)
    }
}

/// Missing on the target, or older there than in the source
fn needs_copy(entry: &FileEntry, destination: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(destination) else {
        return true;
    };
    let target_modified = meta.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
    match (entry.modified, target_modified) {
        (Some(source), Some(target)) => source > target,
        _ => true,
    }
}
