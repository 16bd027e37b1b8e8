//! Practice-log repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the store operations the backup engine depends on.
//! - Keep SQL details inside the core persistence boundary.
//! - Expose transaction and per-record isolation scopes as savepoints.
//!
//! # Invariants
//! - Write paths must call `NewPracticeLog::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Duplicate lookup compares the exact title and the `YYYY-MM-DD` prefix of
//!   the stored RFC 3339 date.

use crate::db::{DbError, JOURNAL_TABLES};
use crate::model::practice_log::{
    format_stored_date, AsanaEntry, AsanaStatus, NewPracticeLog, PhotoReference, PracticeLog,
    PracticeLogValidationError, RecordId,
};
use chrono::{DateTime, Utc};
use log::error;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const PRACTICE_LOG_SELECT_SQL: &str = "SELECT
    id,
    title,
    date,
    duration_minutes,
    intensity,
    note,
    location
FROM practice_logs";

const BATCH_SAVEPOINT: &str = "practice_batch";
const RECORD_SAVEPOINT: &str = "practice_record";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for practice-log persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(PracticeLogValidationError),
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "practice log not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted practice log data: {message}")
            }
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing; run migrations first")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<PracticeLogValidationError> for RepoError {
    fn from(value: PracticeLogValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store interface consumed by the archive writer and reader.
pub trait PracticeLogRepository {
    /// Lists every practice log, newest date first.
    fn list_all_records(&self) -> RepoResult<Vec<PracticeLog>>;
    /// Lists asana entries of one practice log ordered by position.
    fn list_asanas(&self, record_id: RecordId) -> RepoResult<Vec<AsanaEntry>>;
    /// Lists photo references of one practice log ordered by position.
    fn list_photos(&self, record_id: RecordId) -> RepoResult<Vec<PhotoReference>>;
    /// Finds a practice log by exact title and `YYYY-MM-DD` date prefix.
    fn find_by_duplicate_key(&self, title: &str, day_prefix: &str)
        -> RepoResult<Option<PracticeLog>>;
    /// Creates a practice log from validated fields and returns its new id.
    fn create_record(&self, fields: &NewPracticeLog) -> RepoResult<RecordId>;
    fn create_asana_entry(&self, record_id: RecordId, entry: &AsanaEntry) -> RepoResult<()>;
    fn create_photo_entry(&self, record_id: RecordId, photo: &PhotoReference) -> RepoResult<()>;

    /// Runs `f` inside one atomic write scope.
    ///
    /// Everything written by `f` becomes visible together when it returns
    /// `Ok`, and is discarded when it returns `Err`.
    fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;

    /// Runs `f` in a nested scope that can be rolled back on its own while the
    /// enclosing transaction continues.
    fn run_isolated<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed practice-log repository.
pub struct SqlitePracticeLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePracticeLogRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable` when the schema has not been applied.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        for table in JOURNAL_TABLES {
            if !table_exists(conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }

    /// Returns total number of stored practice logs.
    pub fn count_records(&self) -> RepoResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM practice_logs;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    /// Gets one practice log by id.
    pub fn get_record(&self, id: RecordId) -> RepoResult<Option<PracticeLog>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PRACTICE_LOG_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_practice_log_row(row)?));
        }
        Ok(None)
    }

    fn with_savepoint<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        self.conn
            .execute_batch(&format!("SAVEPOINT {name};"))
            .map_err(RepoError::from)?;

        let outcome = f(self);
        match outcome {
            Ok(value) => match self.conn.execute_batch(&format!("RELEASE {name};")) {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.rollback_savepoint(name);
                    Err(RepoError::from(err).into())
                }
            },
            Err(err) => {
                self.rollback_savepoint(name);
                Err(err)
            }
        }
    }

    fn rollback_savepoint(&self, name: &str) {
        if let Err(err) = self
            .conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
        {
            error!(
                "event=savepoint_rollback module=repo status=error savepoint={} error={}",
                name, err
            );
        }
    }
}

impl PracticeLogRepository for SqlitePracticeLogRepository<'_> {
    fn list_all_records(&self) -> RepoResult<Vec<PracticeLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PRACTICE_LOG_SELECT_SQL} ORDER BY date DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_practice_log_row(row)?);
        }
        Ok(logs)
    }

    fn list_asanas(&self, record_id: RecordId) -> RepoResult<Vec<AsanaEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, status, note, position
             FROM asana_entries
             WHERE log_id = ?1
             ORDER BY position ASC, id ASC;",
        )?;
        let mut rows = stmt.query([record_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let status = match row.get::<_, Option<String>>("status")? {
                Some(value) => Some(AsanaStatus::parse(&value).ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "invalid asana status `{value}` in asana_entries.status"
                    ))
                })?),
                None => None,
            };
            entries.push(AsanaEntry {
                name: row.get("name")?,
                status,
                note: row.get("note")?,
                position: read_position(row)?,
            });
        }
        Ok(entries)
    }

    fn list_photos(&self, record_id: RecordId) -> RepoResult<Vec<PhotoReference>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_path, position
             FROM photo_entries
             WHERE log_id = ?1
             ORDER BY position ASC, id ASC;",
        )?;
        let mut rows = stmt.query([record_id.to_string()])?;
        let mut photos = Vec::new();
        while let Some(row) = rows.next()? {
            photos.push(PhotoReference {
                source_path: row.get("source_path")?,
                position: read_position(row)?,
            });
        }
        Ok(photos)
    }

    fn find_by_duplicate_key(
        &self,
        title: &str,
        day_prefix: &str,
    ) -> RepoResult<Option<PracticeLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PRACTICE_LOG_SELECT_SQL}
             WHERE title = ?1
               AND substr(date, 1, 10) = ?2
             ORDER BY date ASC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![title, day_prefix])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_practice_log_row(row)?));
        }
        Ok(None)
    }

    fn create_record(&self, fields: &NewPracticeLog) -> RepoResult<RecordId> {
        fields.validate()?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO practice_logs (
                id,
                title,
                date,
                duration_minutes,
                intensity,
                note,
                location
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                fields.title.as_str(),
                format_stored_date(&fields.date),
                i64::from(fields.duration_minutes),
                i64::from(fields.intensity),
                fields.note.as_str(),
                fields.location.as_deref(),
            ],
        )?;
        Ok(id)
    }

    fn create_asana_entry(&self, record_id: RecordId, entry: &AsanaEntry) -> RepoResult<()> {
        if entry.name.trim().is_empty() {
            return Err(RepoError::InvalidData(
                "asana name must not be blank".to_string(),
            ));
        }

        let changed = self.conn.execute(
            "INSERT INTO asana_entries (log_id, name, status, note, position)
             SELECT id, ?2, ?3, ?4, ?5
             FROM practice_logs
             WHERE id = ?1;",
            params![
                record_id.to_string(),
                entry.name.as_str(),
                entry.status.map(AsanaStatus::as_str),
                entry.note.as_deref(),
                i64::from(entry.position),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(record_id));
        }
        Ok(())
    }

    fn create_photo_entry(&self, record_id: RecordId, photo: &PhotoReference) -> RepoResult<()> {
        let changed = self.conn.execute(
            "INSERT INTO photo_entries (log_id, source_path, position)
             SELECT id, ?2, ?3
             FROM practice_logs
             WHERE id = ?1;",
            params![
                record_id.to_string(),
                photo.source_path.as_str(),
                i64::from(photo.position),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(record_id));
        }
        Ok(())
    }

    fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        self.with_savepoint(BATCH_SAVEPOINT, f)
    }

    fn run_isolated<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        self.with_savepoint(RECORD_SAVEPOINT, f)
    }
}

fn parse_practice_log_row(row: &Row<'_>) -> RepoResult<PracticeLog> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in practice_logs.id"))
    })?;

    let date_text: String = row.get("date")?;
    let date = DateTime::parse_from_rfc3339(&date_text)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid date value `{date_text}` in practice_logs.date"
            ))
        })?;

    let duration: i64 = row.get("duration_minutes")?;
    let duration_minutes = u32::try_from(duration).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid duration `{duration}` in practice_logs.duration_minutes"
        ))
    })?;

    let intensity_value: i64 = row.get("intensity")?;
    let intensity = u8::try_from(intensity_value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid intensity `{intensity_value}` in practice_logs.intensity"
        ))
    })?;

    let fields = NewPracticeLog {
        title: row.get("title")?,
        date,
        duration_minutes,
        intensity,
        note: row.get("note")?,
        location: row.get("location")?,
    };
    fields.validate()?;
    Ok(PracticeLog::with_id(id, fields))
}

fn read_position(row: &Row<'_>) -> RepoResult<u32> {
    let value: i64 = row.get("position")?;
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid position value `{value}`")))
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
