//! Tolerant Markdown parser for archive documents.
//!
//! # Responsibility
//! - Recover a practice log from a document produced by `render_markdown`,
//!   including documents edited by hand or written by older renderers.
//! - Record every fallback as an explicit `Recovery` tag.
//!
//! # Invariants
//! - Parsing never fails: malformed fields resolve to documented defaults.
//! - `None` is returned only for text with no recognizable structure.
//! - Photo links keep only their file name; the path prefix is never trusted.

use super::markdown::{
    ASANAS_HEADER, DATE_LABEL, DURATION_LABEL, FILLED_STAR, FOOTER, INTENSITY_LABEL,
    LOCATION_LABEL, NOTES_HEADER, PHOTOS_HEADER, RENDER_DATE_FORMAT, RULE,
};
use crate::model::practice_log::{
    AsanaEntry, AsanaStatus, NewPracticeLog, MAX_INTENSITY, MIN_INTENSITY,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub const UNTITLED: &str = "Untitled";

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([^#].*)?$").expect("valid title regex"));
static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*h").expect("valid hours regex"));
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*m").expect("valid minutes regex"));
static ASANA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+\.\s+\*\*(.+?)\*\*(?:\s*\(([^)]*)\))?\s*$").expect("valid asana regex")
});
static ASANA_NOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+[-*]\s+(.+)$").expect("valid asana note regex"));
static PHOTO_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").expect("valid photo link regex"));

/// A fallback applied while parsing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// No `# title` line; title defaulted to `Untitled`.
    MissingTitle,
    /// No date line; date defaulted to parse time.
    MissingDate,
    /// Date line present but unparseable; date defaulted to parse time.
    UnparseableDate(String),
    /// No duration line or no `h`/`m` groups; duration defaulted to 0.
    MissingDuration,
    /// No intensity line; intensity defaulted to the minimum.
    MissingIntensity,
    /// Filled-star count outside `1..=5`; value clamped.
    IntensityClamped { found: usize },
    /// Asana status label not recognized; status dropped.
    UnknownAsanaStatus { asana: String, status: String },
}

/// Result of parsing one archive document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPracticeLog {
    pub fields: NewPracticeLog,
    /// Asana entries in document order, positions `0..n`.
    pub asanas: Vec<AsanaEntry>,
    /// Photo file names referenced by the Photos section, in order.
    pub photo_files: Vec<String>,
    pub recoveries: Vec<Recovery>,
}

impl ParsedPracticeLog {
    /// Returns whether the document parsed without any fallback.
    pub fn is_clean(&self) -> bool {
        self.recoveries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Asanas,
    Notes,
    Photos,
    Unknown,
    Trailer,
}

/// Parses a document, using the current time as the date fallback.
pub fn parse_markdown(text: &str) -> Option<ParsedPracticeLog> {
    parse_markdown_at(text, Utc::now())
}

/// Parses a document with an explicit date fallback.
pub fn parse_markdown_at(text: &str, now: DateTime<Utc>) -> Option<ParsedPracticeLog> {
    let mut section = Section::Preamble;
    let mut saw_structure = false;
    let mut recoveries = Vec::new();

    let mut title: Option<String> = None;
    let mut date_value: Option<String> = None;
    let mut duration_value: Option<String> = None;
    let mut intensity_value: Option<String> = None;
    let mut location: Option<String> = None;
    let mut asanas: Vec<AsanaEntry> = Vec::new();
    let mut last_asana_open = false;
    let mut note_lines: Vec<String> = Vec::new();
    let mut photo_files: Vec<String> = Vec::new();

    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        let trimmed = line.trim();

        if trimmed == FOOTER {
            section = Section::Trailer;
            continue;
        }
        if let Some(next) = section_for_header(trimmed) {
            section = next;
            saw_structure = true;
            last_asana_open = false;
            continue;
        }

        match section {
            Section::Preamble | Section::Unknown => {
                if title.is_none() {
                    if let Some(caps) = TITLE_RE.captures(trimmed) {
                        saw_structure = true;
                        let value = caps.get(1).map_or("", |m| m.as_str().trim());
                        if !value.is_empty() {
                            title = Some(value.to_string());
                        }
                        continue;
                    }
                }
                let metadata = [
                    (DATE_LABEL, &mut date_value),
                    (DURATION_LABEL, &mut duration_value),
                    (INTENSITY_LABEL, &mut intensity_value),
                    (LOCATION_LABEL, &mut location),
                ];
                for (label, slot) in metadata {
                    if let Some(value) = strip_label(trimmed, label) {
                        saw_structure = true;
                        if slot.is_none() {
                            *slot = Some(value.to_string());
                        }
                        break;
                    }
                }
            }
            Section::Asanas => {
                if let Some(caps) = ASANA_RE.captures(line) {
                    let name = caps.get(1).map_or("", |m| m.as_str().trim());
                    if name.is_empty() {
                        last_asana_open = false;
                        continue;
                    }
                    let position = u32::try_from(asanas.len()).unwrap_or(u32::MAX);
                    let mut entry = AsanaEntry::new(name, position);
                    if let Some(label) = caps
                        .get(2)
                        .map(|m| m.as_str().trim())
                        .filter(|value| !value.is_empty())
                    {
                        match AsanaStatus::parse(label) {
                            Some(status) => entry.status = Some(status),
                            None => recoveries.push(Recovery::UnknownAsanaStatus {
                                asana: name.to_string(),
                                status: label.to_string(),
                            }),
                        }
                    }
                    asanas.push(entry);
                    last_asana_open = true;
                } else if let Some(caps) = ASANA_NOTE_RE.captures(line) {
                    if last_asana_open {
                        if let Some(entry) = asanas.last_mut() {
                            entry.note = Some(caps[1].trim().to_string());
                        }
                        last_asana_open = false;
                    }
                }
            }
            Section::Notes => {
                if !trimmed.is_empty() && trimmed != RULE {
                    note_lines.push(line.to_string());
                }
            }
            Section::Photos => {
                for caps in PHOTO_LINK_RE.captures_iter(line) {
                    if let Some(file_name) = link_file_name(&caps[1]) {
                        photo_files.push(file_name);
                    }
                }
            }
            Section::Trailer => {}
        }
    }

    if !saw_structure {
        return None;
    }

    let title = title.unwrap_or_else(|| {
        recoveries.push(Recovery::MissingTitle);
        UNTITLED.to_string()
    });
    let date = match date_value {
        Some(value) => parse_date(&value).unwrap_or_else(|| {
            recoveries.push(Recovery::UnparseableDate(value));
            now
        }),
        None => {
            recoveries.push(Recovery::MissingDate);
            now
        }
    };
    let duration_minutes = match duration_value.as_deref().and_then(parse_duration) {
        Some(minutes) => minutes,
        None => {
            recoveries.push(Recovery::MissingDuration);
            0
        }
    };
    let intensity = match intensity_value {
        Some(value) => {
            let found = value.chars().filter(|c| *c == FILLED_STAR).count();
            let clamped = clamp_intensity(found);
            if usize::from(clamped) != found {
                recoveries.push(Recovery::IntensityClamped { found });
            }
            clamped
        }
        None => {
            recoveries.push(Recovery::MissingIntensity);
            MIN_INTENSITY
        }
    };
    let location = location.filter(|value| !value.trim().is_empty());

    Some(ParsedPracticeLog {
        fields: NewPracticeLog {
            title,
            date,
            duration_minutes,
            intensity,
            note: note_lines.join("\n"),
            location,
        },
        asanas,
        photo_files,
        recoveries,
    })
}

fn section_for_header(trimmed: &str) -> Option<Section> {
    if !trimmed.starts_with("## ") {
        return None;
    }
    let section = if trimmed.eq_ignore_ascii_case(ASANAS_HEADER) {
        Section::Asanas
    } else if trimmed.eq_ignore_ascii_case(NOTES_HEADER) {
        Section::Notes
    } else if trimmed.eq_ignore_ascii_case(PHOTOS_HEADER) {
        Section::Photos
    } else {
        Section::Unknown
    };
    Some(section)
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.strip_prefix(label).map(str::trim)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, RENDER_DATE_FORMAT) {
        return Some(naive.and_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_duration(value: &str) -> Option<u32> {
    let hours = HOURS_RE
        .captures(value)
        .map(|caps| caps[1].parse::<u32>().unwrap_or(0));
    let minutes = MINUTES_RE
        .captures(value)
        .map(|caps| caps[1].parse::<u32>().unwrap_or(0));
    if hours.is_none() && minutes.is_none() {
        return None;
    }
    Some(
        hours
            .unwrap_or(0)
            .saturating_mul(60)
            .saturating_add(minutes.unwrap_or(0)),
    )
}

fn clamp_intensity(found: usize) -> u8 {
    let clamped = found.clamp(usize::from(MIN_INTENSITY), usize::from(MAX_INTENSITY));
    u8::try_from(clamped).unwrap_or(MAX_INTENSITY)
}

fn link_file_name(target: &str) -> Option<String> {
    let name = target
        .trim()
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
