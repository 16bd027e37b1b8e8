//! Markdown document renderer for one practice log.
//!
//! # Responsibility
//! - Serialize a `PracticeLogRecord` into the archive document format.
//! - Own the naming scheme for photos referenced from documents.
//!
//! # Invariants
//! - Rendering is pure: the same record always yields byte-identical text.
//! - Section order is fixed: title, metadata, rule, Asanas, Notes, Photos,
//!   footer. `parser::parse_markdown` is the left-inverse of this module.
//! - Photo links use `../Photos/<YYYY-MM-DD>_<recordId>_<n>.jpg`, where `n`
//!   is the photo `position` plus one.

use super::PHOTOS_FOLDER;
use crate::model::practice_log::{PracticeLog, PracticeLogRecord, MAX_INTENSITY};
use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const DATE_LABEL: &str = "**Date:**";
pub(crate) const DURATION_LABEL: &str = "**Duration:**";
pub(crate) const INTENSITY_LABEL: &str = "**Intensity:**";
pub(crate) const LOCATION_LABEL: &str = "**Location:**";
pub(crate) const ASANAS_HEADER: &str = "## Asanas";
pub(crate) const NOTES_HEADER: &str = "## Notes";
pub(crate) const PHOTOS_HEADER: &str = "## Photos";
pub(crate) const RULE: &str = "---";
pub(crate) const FOOTER: &str = "*Exported from Yoga Log*";
pub(crate) const FILLED_STAR: char = '★';
pub(crate) const EMPTY_STAR: char = '☆';
/// Date format used in the metadata block (always UTC).
pub(crate) const RENDER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

static LINE_BREAK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|h[1-6])\s*>").expect("valid line break tag regex")
});
static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));
static EXTRA_BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Renders one practice log as a Markdown document.
pub fn render_markdown(record: &PracticeLogRecord) -> String {
    let log = &record.log;
    let mut out = String::new();

    push_line(&mut out, &format!("# {}", single_line(&log.title)));
    push_line(&mut out, "");
    push_line(
        &mut out,
        &format!("{DATE_LABEL} {}", log.date.format(RENDER_DATE_FORMAT)),
    );
    push_line(
        &mut out,
        &format!("{DURATION_LABEL} {}", format_duration(log.duration_minutes)),
    );
    push_line(
        &mut out,
        &format!("{INTENSITY_LABEL} {}", format_intensity(log.intensity)),
    );
    if let Some(location) = log
        .location
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        push_line(&mut out, &format!("{LOCATION_LABEL} {}", single_line(location)));
    }
    push_line(&mut out, "");
    push_line(&mut out, RULE);
    push_line(&mut out, "");

    let mut asanas = record.asanas.iter().collect::<Vec<_>>();
    asanas.sort_by_key(|entry| entry.position);
    let asana_lines = asanas
        .iter()
        .enumerate()
        .flat_map(|(index, entry)| {
            let mut lines = vec![match entry.status {
                Some(status) => format!(
                    "{}. **{}** ({})",
                    index + 1,
                    single_line(&entry.name),
                    status.as_str()
                ),
                None => format!("{}. **{}**", index + 1, single_line(&entry.name)),
            }];
            if let Some(note) = entry
                .note
                .as_deref()
                .map(single_line)
                .filter(|value| !value.is_empty())
            {
                lines.push(format!("   - {note}"));
            }
            lines
        })
        .collect::<Vec<_>>();
    push_section(&mut out, ASANAS_HEADER, &asana_lines);

    let note = note_to_plain_text(&log.note);
    let note_lines = if note.is_empty() {
        Vec::new()
    } else {
        note.lines().map(str::to_string).collect()
    };
    push_section(&mut out, NOTES_HEADER, &note_lines);

    let mut photos = record.photos.iter().collect::<Vec<_>>();
    photos.sort_by_key(|photo| photo.position);
    let photo_lines = photos
        .iter()
        .map(|photo| {
            let index = photo_index(photo.position);
            format!(
                "![Photo {index}](../{PHOTOS_FOLDER}/{})",
                archive_photo_name(log, index)
            )
        })
        .collect::<Vec<_>>();
    push_section(&mut out, PHOTOS_HEADER, &photo_lines);

    push_line(&mut out, RULE);
    push_line(&mut out, "");
    push_line(&mut out, FOOTER);
    out
}

/// Formats minutes as `"{h}h {m}m"`, omitting the hour part when zero.
pub fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours == 0 {
        format!("{rest}m")
    } else {
        format!("{hours}h {rest}m")
    }
}

/// Formats intensity as five star glyphs, `intensity` of them filled.
pub fn format_intensity(intensity: u8) -> String {
    let filled = usize::from(intensity.min(MAX_INTENSITY));
    let empty = usize::from(MAX_INTENSITY) - filled;
    let mut stars = String::with_capacity(usize::from(MAX_INTENSITY) * 3);
    stars.extend(std::iter::repeat(FILLED_STAR).take(filled));
    stars.extend(std::iter::repeat(EMPTY_STAR).take(empty));
    stars
}

/// Reduces rich-text note markup to plain text.
///
/// Line-break and block-closing tags become newlines, other tags are removed,
/// common entities are decoded, and runs of blank lines collapse to one.
pub fn note_to_plain_text(note: &str) -> String {
    let normalized = note.replace("\r\n", "\n").replace('\r', "\n");
    let with_breaks = LINE_BREAK_TAG_RE.replace_all(&normalized, "\n");
    let without_tags = HTML_TAG_RE.replace_all(&with_breaks, "");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    let trimmed_lines = decoded
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    EXTRA_BLANK_LINES_RE
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

/// File name of the `index`-th (1-based) photo of `log` inside the archive.
pub fn archive_photo_name(log: &PracticeLog, index: usize) -> String {
    format!("{}_{}_{}.jpg", log.day_prefix(), log.id, index)
}

/// 1-based photo index derived from a zero-based position.
pub(crate) fn photo_index(position: u32) -> usize {
    usize::try_from(position).map_or(usize::MAX, |value| value.saturating_add(1))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn push_section(out: &mut String, header: &str, lines: &[String]) {
    push_line(out, header);
    push_line(out, "");
    if lines.is_empty() {
        return;
    }
    for line in lines {
        push_line(out, line);
    }
    push_line(out, "");
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
