//! `yogalog` command-line entry point.
//!
//! # Responsibility
//! - Run backup export/import against a local practice-log database.
//! - Print the run result as JSON on stdout; progress goes to stderr.

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use yogalog_core::db::open_db;
use yogalog_core::{
    default_log_level, init_logging, init_stderr_logging, ArchiveReader, ArchiveWriter,
    BackupProgress, FsPhotoSource, ManagedPhotoDir, ProgressReporter,
    SqlitePracticeLogRepository,
};

mod cli;

use cli::{Cli, Commands, ExportArgs, ImportArgs};

fn main() {
    if let Err(error) = run() {
        eprintln!("yogalog error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    match cli.log_dir.as_deref() {
        Some(dir) => init_logging(level, dir),
        None => init_stderr_logging(level),
    }
    .map_err(anyhow::Error::msg)
    .context("failed to initialize logging")?;

    info!(
        "event=cli_start module=cli status=ok version={}",
        yogalog_core::core_version()
    );

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;
    let repo = SqlitePracticeLogRepository::try_new(&conn)
        .context("database is missing practice-log tables")?;

    let quiet = cli.quiet;
    let mut reporter = ProgressReporter::new(move |progress: BackupProgress| {
        if !quiet {
            eprintln!(
                "[{}] {}/{}",
                progress.stage.as_str(),
                progress.current,
                progress.total
            );
        }
    });

    let output = match &cli.command {
        Commands::Export(args) => export(repo, args, &mut reporter)?,
        Commands::Import(args) => import(repo, args, &mut reporter)?,
    };
    println!("{output}");
    Ok(())
}

fn export(
    repo: SqlitePracticeLogRepository<'_>,
    args: &ExportArgs,
    reporter: &mut ProgressReporter<'_>,
) -> anyhow::Result<String> {
    let source = match &args.photo_source_dir {
        Some(dir) => FsPhotoSource::with_base_dir(dir),
        None => FsPhotoSource::new(),
    };
    let writer = ArchiveWriter::new(repo, source);
    let summary = match &args.output {
        Some(path) => writer.export_to(path, reporter),
        None => writer.export_all(&args.out_dir, reporter),
    }
    .context("export failed")?;
    serde_json::to_string_pretty(&summary).context("failed to encode export summary")
}

fn import(
    repo: SqlitePracticeLogRepository<'_>,
    args: &ImportArgs,
    reporter: &mut ProgressReporter<'_>,
) -> anyhow::Result<String> {
    let reader = ArchiveReader::new(repo, ManagedPhotoDir::new(&args.photo_dir));
    let result = reader
        .import_all(&args.archive, reporter)
        .with_context(|| format!("import of `{}` failed", args.archive.display()))?;
    if result.has_errors() {
        warn!(
            "event=cli_import module=cli status=partial imported={} failed={}",
            result.imported_count,
            result.errors.len()
        );
    }
    serde_json::to_string_pretty(&result).context("failed to encode import result")
}
