use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use humansize::{format_size, DECIMAL};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use twinsync::cli::{
    BackupArgs, CleanupArgs, Cli, Commands, FilterArgs, ListHistoryArgs, RestoreArgs, SearchArgs,
    SyncArgs,
};
use twinsync::config::Config;
use twinsync::hash::Comparator;
use twinsync::history::{FileVersionRecord, HistoryStore, RestoreEngine};
use twinsync::logging;
use twinsync::sync::{CopyOptions, ParallelCopier, PathFilter, SyncEngine, SyncReport, SyncSettings};

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Sync(args) => run_sync(&config, args),
        Commands::Backup(args) => run_backup(&config, args),
        Commands::Restore(args) => run_restore(&config, args),
        Commands::ListDeleted(args) => {
            let engine = RestoreEngine::new(open_history(&config)?);
            print_records(&engine.list_deleted(), args.json)
        }
        Commands::ListHistory(ListHistoryArgs { path, json }) => {
            let engine = RestoreEngine::new(open_history(&config)?);
            print_records(&engine.list_history(&absolute(&path)?), json)
        }
        Commands::Search(SearchArgs { text, from, to, json }) => {
            let history = open_history(&config)?;
            print_records(&history.search(&text, from, to), json)
        }
        Commands::Cleanup(args) => run_cleanup(&config, args),
    }
}

fn open_history(config: &Config) -> Result<Arc<HistoryStore>> {
    let database = config.database_path();
    let store = HistoryStore::open_sqlite(&config.history_dir, &database)
        .with_context(|| format!("opening history database {}", database.display()))?;
    store.initialize().context("initializing history")?;
    Ok(Arc::new(store))
}

fn build_filter(config: &Config, args: &FilterArgs) -> Result<PathFilter> {
    config
        .filter(&args.include, &args.exclude)
        .context("compiling filter patterns")
}

fn run_sync(config: &Config, args: SyncArgs) -> Result<()> {
    let options = CopyOptions::new(&args.source, &args.target)
        .with_filter(build_filter(config, &args.filter)?)
        .with_dry_run(args.dry_run)
        .with_delete_extraneous(args.delete_extraneous);
    let settings = SyncSettings {
        mode: args.mode.into(),
        ..SyncSettings::default()
    }
    .with_conflict_dir(args.conflict_dir.unwrap_or_else(|| config.conflict_dir.clone()));

    let engine = SyncEngine::new(Comparator::new(), open_history(config)?);
    let report = engine
        .run(&options, Some(&settings))
        .with_context(|| format!("syncing {} with {}", args.source.display(), args.target.display()))?;

    if args.json {
        return print_json(&report);
    }
    print_sync_report(&report);
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    let heading = if report.dry_run { "Dry run complete" } else { "Sync complete" };
    println!("{}", heading.bold());
    println!("  synchronized: {}", report.files_synchronized.to_string().green());
    println!("  identical:    {}", report.skipped_identical);
    if report.files_deleted > 0 {
        println!("  deleted:      {}", report.files_deleted.to_string().yellow());
    }
    if report.conflicts_detected > 0 {
        println!("  conflicts:    {}", report.conflicts_detected.to_string().yellow());
        for conflict in &report.conflicts {
            println!(
                "    {} {} (backup: {})",
                "!".yellow(),
                conflict.source_path.display(),
                conflict.backup_path.display()
            );
        }
    }
    if report.errors > 0 {
        println!("  errors:       {}", report.errors.to_string().red());
    }
    println!("  took {:.2?}", report.duration);
}

fn run_backup(config: &Config, args: BackupArgs) -> Result<()> {
    let options = CopyOptions::new(&args.source, &args.target)
        .with_filter(build_filter(config, &args.filter)?)
        .with_dry_run(args.dry_run);
    let copier = ParallelCopier::new(args.parallelism.unwrap_or(config.parallelism))
        .with_progress(!args.quiet && !args.dry_run);

    let report = copier
        .run(&options)
        .with_context(|| format!("backing up {}", args.source.display()))?;

    let verb = if report.dry_run { "Would copy" } else { "Copied" };
    println!(
        "{} {} files ({}), {} up to date, {} errors in {:.2?}",
        verb.bold(),
        report.files_copied.to_string().green(),
        format_size(report.bytes_copied, DECIMAL),
        report.files_up_to_date,
        if report.errors > 0 {
            report.errors.to_string().red()
        } else {
            report.errors.to_string().normal()
        },
        report.duration
    );
    Ok(())
}

fn run_restore(config: &Config, args: RestoreArgs) -> Result<()> {
    let engine = RestoreEngine::new(open_history(config)?);
    let outcome = engine.restore(&absolute(&args.path)?, args.as_of);

    if args.json {
        print_json(&outcome)?;
    } else if outcome.success {
        println!("{} {}", "✓".green(), outcome.message);
    } else {
        println!("{} {}", "✗".red(), outcome.message);
        for error in outcome.errors.iter().filter(|e| **e != outcome.message) {
            println!("  {}", error.dimmed());
        }
    }

    if !outcome.success {
        bail!("restore failed");
    }
    Ok(())
}

fn run_cleanup(config: &Config, args: CleanupArgs) -> Result<()> {
    let history = open_history(config)?;
    let retention_days = args.retention_days.unwrap_or(config.retention_days);
    let report = history
        .cleanup_expired(retention_days)
        .context("cleaning up history")?;

    println!(
        "Removed {} records and {} snapshot files older than {} days",
        report.records_removed.to_string().green(),
        report.files_removed,
        retention_days
    );
    if report.file_failures > 0 {
        println!("{} snapshot files could not be deleted", report.file_failures.to_string().red());
    }

    if args.orphans {
        let orphans = history.orphaned_snapshots();
        if orphans.is_empty() {
            println!("No orphaned snapshots");
        }
        for orphan in orphans {
            println!("  {} {}", "orphan".yellow(), orphan.display());
        }
    }
    Ok(())
}

fn print_records(records: &[FileVersionRecord], json: bool) -> Result<()> {
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("{}", "No records".dimmed());
        return Ok(());
    }
    for record in records {
        let change = record.change_type.to_string();
        let change = if record.is_deleted { change.red() } else { change.cyan() };
        println!(
            "{:>6}  {}  {:<8}  {:>10}  {}",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            change,
            format_size(record.file_size, DECIMAL),
            record.canonical_path.display()
        );
        if !record.reason.is_empty() {
            println!("        {}", record.reason.dimmed());
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
    Ok(())
}

/// History is keyed by the canonical path the engine saw, which may no
/// longer exist on disk
fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return Ok(resolved);
    }
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("reading current directory")?
            .join(path)
    };
    match (path.parent().map(std::fs::canonicalize), path.file_name()) {
        (Some(Ok(parent)), Some(name)) => Ok(parent.join(name)),
        _ => Ok(path),
    }
}
