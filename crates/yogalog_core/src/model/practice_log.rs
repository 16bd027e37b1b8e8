//! Practice-log domain model.
//!
//! # Responsibility
//! - Define the canonical practice session record and its nested asana/photo
//!   collections.
//! - Validate user-facing fields before they reach persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another practice log.
//! - `title` is never blank once validated.
//! - `intensity` stays within `1..=5`.
//! - Asana and photo `position` values define render/restore order.
//!
//! # See also
//! - `crate::backup::markdown` for the document form of this model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a practice log.
pub type RecordId = Uuid;

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 5;

/// Learning progress for one pose inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsanaStatus {
    Mastered,
    Practicing,
    Learning,
    Attempted,
}

impl AsanaStatus {
    /// Stable lowercase label used by storage and the Markdown format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mastered => "mastered",
            Self::Practicing => "practicing",
            Self::Learning => "learning",
            Self::Attempted => "attempted",
        }
    }

    /// Parses a label case-insensitively. Unknown labels return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mastered" => Some(Self::Mastered),
            "practicing" => Some(Self::Practicing),
            "learning" => Some(Self::Learning),
            "attempted" => Some(Self::Attempted),
            _ => None,
        }
    }
}

/// One pose performed within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsanaEntry {
    pub name: String,
    pub status: Option<AsanaStatus>,
    pub note: Option<String>,
    /// Zero-based order inside the session.
    pub position: u32,
}

impl AsanaEntry {
    pub fn new(name: impl Into<String>, position: u32) -> Self {
        Self {
            name: name.into(),
            status: None,
            note: None,
            position,
        }
    }

    pub fn with_status(mut self, status: AsanaStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// One photo attached to a session.
///
/// `source_path` is opaque to the backup codec: it is owned by the platform
/// photo store at export time and by managed storage after import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoReference {
    pub source_path: String,
    /// Zero-based order inside the session.
    pub position: u32,
}

impl PhotoReference {
    pub fn new(source_path: impl Into<String>, position: u32) -> Self {
        Self {
            source_path: source_path.into(),
            position,
        }
    }
}

/// Fully formed field set for creating a practice log.
///
/// The store assigns identity; callers never construct partial rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPracticeLog {
    pub title: String,
    pub date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub intensity: u8,
    pub note: String,
    pub location: Option<String>,
}

impl NewPracticeLog {
    pub fn new(title: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            date,
            duration_minutes: 0,
            intensity: MIN_INTENSITY,
            note: String::new(),
            location: None,
        }
    }

    /// Validates user-facing invariants.
    ///
    /// # Errors
    /// - `EmptyTitle` when the title is blank.
    /// - `IntensityOutOfRange` when intensity is outside `1..=5`.
    pub fn validate(&self) -> Result<(), PracticeLogValidationError> {
        if self.title.trim().is_empty() {
            return Err(PracticeLogValidationError::EmptyTitle);
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&self.intensity) {
            return Err(PracticeLogValidationError::IntensityOutOfRange(
                self.intensity,
            ));
        }
        Ok(())
    }

    /// Calendar-day prefix used by duplicate detection.
    pub fn day_prefix(&self) -> String {
        day_prefix(&self.date)
    }
}

/// Persisted practice-log row (without nested collections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeLog {
    pub id: RecordId,
    pub title: String,
    pub date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub intensity: u8,
    pub note: String,
    pub location: Option<String>,
}

impl PracticeLog {
    /// Assigns a freshly generated identity to validated fields.
    pub fn from_new(fields: NewPracticeLog) -> Self {
        Self::with_id(Uuid::new_v4(), fields)
    }

    pub fn with_id(id: RecordId, fields: NewPracticeLog) -> Self {
        Self {
            id,
            title: fields.title,
            date: fields.date,
            duration_minutes: fields.duration_minutes,
            intensity: fields.intensity,
            note: fields.note,
            location: fields.location,
        }
    }

    pub fn day_prefix(&self) -> String {
        day_prefix(&self.date)
    }
}

/// One practice log together with its ordered asana and photo collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeLogRecord {
    pub log: PracticeLog,
    pub asanas: Vec<AsanaEntry>,
    pub photos: Vec<PhotoReference>,
}

impl PracticeLogRecord {
    pub fn new(log: PracticeLog) -> Self {
        Self {
            log,
            asanas: Vec::new(),
            photos: Vec::new(),
        }
    }
}

/// Validation errors raised at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeLogValidationError {
    EmptyTitle,
    IntensityOutOfRange(u8),
}

impl Display for PracticeLogValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title must not be blank"),
            Self::IntensityOutOfRange(value) => write!(
                f,
                "intensity {value} is outside {MIN_INTENSITY}..={MAX_INTENSITY}"
            ),
        }
    }
}

impl Error for PracticeLogValidationError {}

/// Returns the `YYYY-MM-DD` calendar day of a UTC timestamp.
pub fn day_prefix(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Canonical persisted form of a timestamp (RFC 3339, second precision).
pub fn format_stored_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}
