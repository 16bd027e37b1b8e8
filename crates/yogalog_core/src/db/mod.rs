//! SQLite storage for the practice journal.
//!
//! The journal schema has three tables:
//! - `practice_logs`: one row per session (title, date, duration, intensity,
//!   rich-text note, optional location).
//! - `asana_entries`: ordered poses of a session, cascade-deleted with it.
//! - `photo_entries`: ordered photo paths of a session, cascade-deleted with it.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`; a journal written by
//!   a newer build is refused, never downgraded.
//! - Connections enforce foreign keys before any journal row is touched.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

/// Tables a migrated journal must contain, parents first.
pub const JOURNAL_TABLES: [&str; 3] = ["practice_logs", "asana_entries", "photo_entries"];

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The journal was migrated by a newer build.
    SchemaTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "journal database error: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "journal schema version {found} is newer than supported {supported}; update the app"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
