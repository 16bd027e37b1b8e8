//! Backup/restore engine for the practice journal.
//!
//! # Responsibility
//! - Export every practice log into one portable zip archive of Markdown
//!   documents plus embedded photos.
//! - Import such an archive back, skipping duplicates and isolating failures
//!   to the smallest unit (photo, document, record).
//!
//! # Invariants
//! - Archive layout is fixed: `Yoga_Logs/*.md`, `Photos/*.jpg`, `README.md`.
//! - Fatal failures surface as `BackupError`; per-unit failures never abort a
//!   run.
//! - Runs are sequential; progress counters are monotonic within a stage.

use crate::repo::practice_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub mod markdown;
pub mod parser;
pub mod photo;
pub mod progress;
pub mod reader;
pub mod writer;

/// Archive folder holding one Markdown document per practice log.
pub const LOGS_FOLDER: &str = "Yoga_Logs";
/// Archive folder holding embedded photo binaries.
pub const PHOTOS_FOLDER: &str = "Photos";
/// Archive manifest document name.
pub const README_NAME: &str = "README.md";

pub type BackupResult<T> = Result<T, BackupError>;

/// Fatal errors that abort a whole export or import run.
#[derive(Debug)]
pub enum BackupError {
    /// Export requested while the store holds no practice logs.
    EmptyStore,
    /// Archive opened but contains no documents under `Yoga_Logs/`.
    NoRecordsFound,
    /// Input could not be opened as a zip archive.
    InvalidArchive(String),
    /// Caller cancelled the run.
    Cancelled,
    Archive(zip::result::ZipError),
    Io(io::Error),
    Repo(RepoError),
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStore => write!(f, "there are no practice logs to export"),
            Self::NoRecordsFound => {
                write!(f, "no practice log documents found in `{LOGS_FOLDER}/`")
            }
            Self::InvalidArchive(message) => write!(f, "not a valid backup archive: {message}"),
            Self::Cancelled => write!(f, "backup run was cancelled"),
            Self::Archive(err) => write!(f, "archive error: {err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Archive(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::EmptyStore | Self::NoRecordsFound | Self::InvalidArchive(_) | Self::Cancelled => {
                None
            }
        }
    }
}

impl From<RepoError> for BackupError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<io::Error> for BackupError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Archive(value)
    }
}

impl BackupError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyStore => "empty_store",
            Self::NoRecordsFound => "no_records_found",
            Self::InvalidArchive(_) => "invalid_archive",
            Self::Cancelled => "cancelled",
            Self::Archive(_) => "archive_io",
            Self::Io(_) => "io",
            Self::Repo(_) => "repo",
        }
    }
}
