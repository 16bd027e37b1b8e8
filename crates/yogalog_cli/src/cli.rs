//! Command-line surface for the `yogalog` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI parser for the `yogalog` binary.
#[derive(Debug, Parser)]
#[command(name = "yogalog", version, about = "Yoga Log - practice journal backup and restore")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path of the practice-log database
    #[arg(long, global = true, env = "YOGALOG_DB_PATH", default_value = "yogalog.sqlite3")]
    pub db: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, env = "YOGALOG_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files (stderr when unset)
    #[arg(long, global = true, env = "YOGALOG_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Suppress progress lines on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write every practice log into a new backup archive
    Export(ExportArgs),
    /// Merge a backup archive into the database
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Directory that receives the timestamped archive
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Exact archive path; overrides --out-dir
    #[arg(long, conflicts_with = "out_dir")]
    pub output: Option<PathBuf>,

    /// Base directory for relative photo paths stored in the journal
    #[arg(long, env = "YOGALOG_PHOTO_SOURCE_DIR")]
    pub photo_source_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Backup archive to import
    pub archive: PathBuf,

    /// Managed directory that receives imported photos
    #[arg(long, env = "YOGALOG_PHOTO_DIR", default_value = "photos")]
    pub photo_dir: PathBuf,
}
