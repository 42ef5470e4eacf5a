use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::sync::SyncMode;

/// twinsync - keep two directory trees in step without losing a version
///
/// Every file the sync overwrites or deletes is preserved in a history
/// directory first and can be restored later, optionally as of a point in time.
#[derive(Parser, Debug)]
#[command(name = "twinsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/twinsync/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize two directories, preserving replaced files in history
    #[command(after_help = "EXAMPLES:
    # Keep two folders in step both ways
    twinsync sync ~/work /mnt/backup/work

    # Mirror one way and move files deleted at the source into history
    twinsync sync ~/work /mnt/backup/work --mode one-way --delete

    # Show what would happen
    twinsync sync ~/work /mnt/backup/work --dry-run
")]
    Sync(SyncArgs),

    /// Copy new and updated files one way, in parallel
    Backup(BackupArgs),

    /// Restore a file from history
    #[command(after_help = "EXAMPLES:
    # Latest preserved version
    twinsync restore /mnt/backup/work/report.txt

    # Version as it was at the end of a given day
    twinsync restore /mnt/backup/work/report.txt --as-of 2024-03-01
")]
    Restore(RestoreArgs),

    /// List files deleted by sync
    ListDeleted(ListArgs),

    /// List every recorded version of one file
    ListHistory(ListHistoryArgs),

    /// Search history records by path substring
    Search(SearchArgs),

    /// Delete history older than the retention period
    Cleanup(CleanupArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    OneWay,
    Bidirectional,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::OneWay => SyncMode::OneWay,
            ModeArg::Bidirectional => SyncMode::Bidirectional,
        }
    }
}

/// Path filtering shared by sync and backup
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only include paths matching this pattern (repeatable)
    #[arg(long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Exclude paths matching this pattern (repeatable, checked first)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    pub source: PathBuf,
    pub target: PathBuf,

    #[arg(long, value_enum, default_value = "bidirectional")]
    pub mode: ModeArg,

    /// Classify and report only
    #[arg(long)]
    pub dry_run: bool,

    /// One-way only: move target files missing from the source into history
    #[arg(long = "delete")]
    pub delete_extraneous: bool,

    /// Conflict backup directory inside the source root
    #[arg(long, value_name = "DIR")]
    pub conflict_dir: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    pub source: PathBuf,
    pub target: PathBuf,

    /// Worker threads (default from config, else CPU count)
    #[arg(short = 'j', long)]
    pub parallelism: Option<usize>,

    #[arg(long)]
    pub dry_run: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Original location of the file
    pub path: PathBuf,

    /// Restore the version current at this time (RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`)
    #[arg(long, value_parser = parse_point_in_time)]
    pub as_of: Option<DateTime<Utc>>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListHistoryArgs {
    pub path: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Case-insensitive path substring
    pub text: String,

    /// Earliest record time; a bare date means the start of that day
    #[arg(long, value_parser = parse_range_start)]
    pub from: Option<DateTime<Utc>>,

    /// Latest record time; a bare date means the end of that day
    #[arg(long, value_parser = parse_point_in_time)]
    pub to: Option<DateTime<Utc>>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Override the configured retention period
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Also report snapshot files no record points at
    #[arg(long)]
    pub orphans: bool,
}

/// Parse a user-supplied point in time as UTC.
///
/// A bare date means the last microsecond of that day, so `--as-of 2024-03-01`
/// includes everything recorded on the 1st.
pub fn parse_point_in_time(input: &str) -> Result<DateTime<Utc>, String> {
    parse_bound(input, |date| {
        date.succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight - Duration::microseconds(1))
    })
}

/// Like [`parse_point_in_time`], but a bare date means midnight at its start.
pub fn parse_range_start(input: &str) -> Result<DateTime<Utc>, String> {
    parse_bound(input, |date| date.and_hms_opt(0, 0, 0))
}

fn parse_bound(
    input: &str,
    bare_date: impl Fn(NaiveDate) -> Option<NaiveDateTime>,
) -> Result<DateTime<Utc>, String> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(bare_date)
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    Err(format!(
        "invalid date '{}': expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'",
        input
    ))
}
