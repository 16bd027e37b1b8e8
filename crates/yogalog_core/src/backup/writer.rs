//! Archive writer: exports every practice log into one zip archive.
//!
//! # Responsibility
//! - Enumerate practice logs, plan one Markdown document per log, and stream
//!   referenced photos into the archive.
//! - Persist the archive atomically at the requested path.
//!
//! # Invariants
//! - Stages are reported as `preparing -> creating_files -> copying_photos ->
//!   zipping -> done`.
//! - `creating_files` plans one document per log (name, asanas, photos);
//!   document bytes are rendered and written under `zipping`, once the photo
//!   pass has settled which photos each document may link.
//! - A document's Photos section only lists photos whose bytes were embedded.
//! - Fatal failures leave no file at the destination path.

use super::markdown::{archive_photo_name, render_markdown};
use super::photo::PhotoSource;
use super::progress::{BackupStage, ProgressReporter};
use super::{BackupError, BackupResult, LOGS_FOLDER, PHOTOS_FOLDER, README_NAME};
use crate::model::practice_log::{PracticeLog, PracticeLogRecord};
use crate::repo::practice_repo::{PracticeLogRepository, RepoResult};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ILLEGAL_FILE_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Export tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Maximum characters kept from a sanitized title in document names.
    pub title_max_chars: usize,
    /// Prefix of archive file names produced by `export_all`.
    pub file_name_prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title_max_chars: 50,
            file_name_prefix: "yoga_logs_backup".to_string(),
        }
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub record_count: usize,
    pub photo_count: usize,
    /// Photos dropped because their source was missing or unreadable.
    pub skipped_photos: usize,
}

struct DocumentPlan {
    record: PracticeLogRecord,
    file_name: String,
}

struct PhotoTask {
    plan_index: usize,
    position: u32,
    source_path: String,
    archive_name: String,
}

/// Exports the whole store into a zip archive.
pub struct ArchiveWriter<R: PracticeLogRepository, P: PhotoSource> {
    repo: R,
    photos: P,
    options: ExportOptions,
}

impl<R: PracticeLogRepository, P: PhotoSource> ArchiveWriter<R, P> {
    pub fn new(repo: R, photos: P) -> Self {
        Self::with_options(repo, photos, ExportOptions::default())
    }

    pub fn with_options(repo: R, photos: P, options: ExportOptions) -> Self {
        Self {
            repo,
            photos,
            options,
        }
    }

    /// Exports into `out_dir` under a timestamped file name.
    pub fn export_all(
        &self,
        out_dir: &Path,
        reporter: &mut ProgressReporter<'_>,
    ) -> BackupResult<ExportSummary> {
        let file_name = format!(
            "{}_{}.zip",
            self.options.file_name_prefix,
            Utc::now().format("%Y-%m-%d_%H%M%S")
        );
        self.export_to(&out_dir.join(file_name), reporter)
    }

    /// Exports into exactly `path`, replacing any existing file on success.
    ///
    /// # Errors
    /// - `EmptyStore` when there is nothing to export.
    /// - `Cancelled` when the reporter's token is cancelled.
    /// - `Archive`/`Io` when the container cannot be built or persisted.
    pub fn export_to(
        &self,
        path: &Path,
        reporter: &mut ProgressReporter<'_>,
    ) -> BackupResult<ExportSummary> {
        let started_at = Instant::now();
        info!(
            "event=backup_export module=backup status=start path={}",
            path.display()
        );

        match self.export_inner(path, reporter) {
            Ok(summary) => {
                info!(
                    "event=backup_export module=backup status=ok duration_ms={} records={} photos={} skipped_photos={}",
                    started_at.elapsed().as_millis(),
                    summary.record_count,
                    summary.photo_count,
                    summary.skipped_photos
                );
                Ok(summary)
            }
            Err(err) => {
                error!(
                    "event=backup_export module=backup status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    fn export_inner(
        &self,
        path: &Path,
        reporter: &mut ProgressReporter<'_>,
    ) -> BackupResult<ExportSummary> {
        reporter.report(BackupStage::Preparing, 0, 0);
        reporter.checkpoint()?;

        let logs = self.repo.list_all_records()?;
        if logs.is_empty() {
            return Err(BackupError::EmptyStore);
        }

        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let temp = NamedTempFile::new_in(&parent)?;
        let mut zip = ZipWriter::new(BufWriter::new(temp));
        let text_options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let photo_options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.add_directory(LOGS_FOLDER, text_options)?;
        zip.add_directory(PHOTOS_FOLDER, text_options)?;

        let total_logs = logs.len();
        let mut plans = Vec::with_capacity(total_logs);
        let mut used_names = HashSet::new();
        let mut skipped_photos = 0;
        for (index, log) in logs.into_iter().enumerate() {
            reporter.checkpoint()?;
            let log_id = log.id;
            match self.plan_document(log, &mut used_names) {
                Ok((plan, missing)) => {
                    skipped_photos += missing;
                    plans.push(plan);
                }
                Err(err) => warn!(
                    "event=backup_export_record module=backup status=skipped record_id={} error={}",
                    log_id, err
                ),
            }
            reporter.report(BackupStage::CreatingFiles, index + 1, total_logs);
        }

        let tasks = collect_photo_tasks(&plans);
        let mut embedded = HashSet::new();
        reporter.report(BackupStage::CopyingPhotos, 0, tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            reporter.checkpoint()?;
            match self.embed_photo(&mut zip, task, photo_options) {
                Ok(()) => {
                    embedded.insert((task.plan_index, task.position));
                }
                Err(err) => {
                    skipped_photos += 1;
                    warn!(
                        "event=backup_export_photo module=backup status=skipped source={} error={}",
                        task.source_path, err
                    );
                }
            }
            reporter.report(BackupStage::CopyingPhotos, index + 1, tasks.len());
        }

        let zip_total = plans.len() + 1;
        for (index, plan) in plans.iter_mut().enumerate() {
            reporter.checkpoint()?;
            plan.record
                .photos
                .retain(|photo| embedded.contains(&(index, photo.position)));
            zip.start_file(format!("{LOGS_FOLDER}/{}", plan.file_name), text_options)?;
            zip.write_all(render_markdown(&plan.record).as_bytes())?;
            reporter.report(BackupStage::Zipping, index + 1, zip_total);
        }

        zip.start_file(README_NAME, text_options)?;
        zip.write_all(render_manifest(plans.len(), embedded.len(), Utc::now()).as_bytes())?;
        reporter.report(BackupStage::Zipping, zip_total, zip_total);
        reporter.checkpoint()?;

        let temp = zip
            .finish()?
            .into_inner()
            .map_err(|err| BackupError::Io(err.into_error()))?;
        temp.persist(path).map_err(|err| BackupError::Io(err.error))?;
        reporter.report(BackupStage::Done, plans.len(), plans.len());

        Ok(ExportSummary {
            path: path.to_path_buf(),
            record_count: plans.len(),
            photo_count: embedded.len(),
            skipped_photos,
        })
    }

    fn plan_document(
        &self,
        log: PracticeLog,
        used_names: &mut HashSet<String>,
    ) -> RepoResult<(DocumentPlan, usize)> {
        let asanas = self.repo.list_asanas(log.id)?;
        let mut photos = self.repo.list_photos(log.id)?;
        for (position, photo) in photos.iter_mut().enumerate() {
            photo.position = u32::try_from(position).unwrap_or(u32::MAX);
        }
        let before = photos.len();
        photos.retain(|photo| {
            let exists = self.photos.file_exists(&photo.source_path);
            if !exists {
                warn!(
                    "event=backup_export_photo module=backup status=missing record_id={} source={}",
                    log.id, photo.source_path
                );
            }
            exists
        });
        let missing = before - photos.len();

        let file_name = unique_document_name(&log, self.options.title_max_chars, used_names);
        Ok((
            DocumentPlan {
                record: PracticeLogRecord {
                    log,
                    asanas,
                    photos,
                },
                file_name,
            },
            missing,
        ))
    }

    fn embed_photo<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        task: &PhotoTask,
        options: SimpleFileOptions,
    ) -> BackupResult<()> {
        let mut reader = self.photos.open(&task.source_path)?;
        zip.start_file(format!("{PHOTOS_FOLDER}/{}", task.archive_name), options)?;
        if let Err(err) = io::copy(&mut reader, zip) {
            if let Err(abort_err) = zip.abort_file() {
                return Err(abort_err.into());
            }
            return Err(err.into());
        }
        Ok(())
    }
}

fn collect_photo_tasks(plans: &[DocumentPlan]) -> Vec<PhotoTask> {
    plans
        .iter()
        .enumerate()
        .flat_map(|(plan_index, plan)| {
            plan.record.photos.iter().map(move |photo| PhotoTask {
                plan_index,
                position: photo.position,
                source_path: photo.source_path.clone(),
                archive_name: archive_photo_name(
                    &plan.record.log,
                    super::markdown::photo_index(photo.position),
                ),
            })
        })
        .collect()
}

/// Document name `<YYYY-MM-DD>_<sanitizedTitle>.md`, suffixed with a short
/// record id when the name is already taken in this archive, then with a
/// counter until the name is unused.
pub fn unique_document_name(
    log: &PracticeLog,
    title_max_chars: usize,
    used_names: &mut HashSet<String>,
) -> String {
    let base = format!(
        "{}_{}",
        log.day_prefix(),
        sanitize_title(&log.title, title_max_chars)
    );
    let mut name = format!("{base}.md");
    if used_names.contains(&name) {
        let id = log.id.simple().to_string();
        let short_id = &id[..8];
        name = format!("{base}_{short_id}.md");
        let mut counter = 2_u32;
        while used_names.contains(&name) {
            name = format!("{base}_{short_id}_{counter}.md");
            counter += 1;
        }
    }
    used_names.insert(name.clone());
    name
}

/// Strips characters illegal in file names, joins words with `_`, and
/// truncates to `max_chars`.
pub fn sanitize_title(title: &str, max_chars: usize) -> String {
    let cleaned = title
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_FILE_NAME_CHARS.contains(c))
        .collect::<String>();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated = joined.chars().take(max_chars).collect::<String>();
    let trimmed = truncated.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Renders the archive `README.md`.
pub fn render_manifest(record_count: usize, photo_count: usize, generated_at: DateTime<Utc>) -> String {
    format!(
        "# Yoga Log Backup\n\
         \n\
         Generated: {}\n\
         Practice logs: {record_count}\n\
         Photos: {photo_count}\n\
         \n\
         ## Contents\n\
         \n\
         - `{LOGS_FOLDER}/` one Markdown document per practice session\n\
         - `{PHOTOS_FOLDER}/` photos referenced from those documents\n\
         \n\
         ## Restoring\n\
         \n\
         Import this archive from the app. Sessions that already exist with the\n\
         same title on the same day are skipped; everything else is added.\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::{render_manifest, sanitize_title, unique_document_name};
    use crate::model::practice_log::{NewPracticeLog, PracticeLog};
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    #[test]
    fn sanitize_strips_illegal_chars_and_truncates() {
        assert_eq!(sanitize_title("Morning Flow", 50), "Morning_Flow");
        assert_eq!(sanitize_title("a/b:c*d?\"e<f>g|h", 50), "abcdefgh");
        assert_eq!(sanitize_title("   ", 50), "Untitled");
        assert_eq!(sanitize_title("Sun Salutation Series", 8), "Sun_Salu");
    }

    #[test]
    fn colliding_document_names_get_an_id_suffix() {
        let date = Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap();
        let first = PracticeLog::from_new(NewPracticeLog::new("Flow?", date));
        let second = PracticeLog::from_new(NewPracticeLog::new("Flow", date));
        let mut used = HashSet::new();

        let first_name = unique_document_name(&first, 50, &mut used);
        let second_name = unique_document_name(&second, 50, &mut used);

        assert_eq!(first_name, "2026-01-15_Flow.md");
        assert_ne!(first_name, second_name);
        assert!(second_name.starts_with("2026-01-15_Flow_"));
        assert!(second_name.ends_with(".md"));
    }

    #[test]
    fn suffixed_name_already_taken_falls_through_to_counter() {
        let date = Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap();
        let first = PracticeLog::from_new(NewPracticeLog::new("Flow", date));
        let second = PracticeLog::from_new(NewPracticeLog::new("Flow", date));
        let short_id = second.id.simple().to_string()[..8].to_string();
        let lookalike =
            PracticeLog::from_new(NewPracticeLog::new(format!("Flow {short_id}"), date));
        let mut used = HashSet::new();

        let first_name = unique_document_name(&first, 50, &mut used);
        let lookalike_name = unique_document_name(&lookalike, 50, &mut used);
        let second_name = unique_document_name(&second, 50, &mut used);

        assert_eq!(first_name, "2026-01-15_Flow.md");
        assert_eq!(lookalike_name, format!("2026-01-15_Flow_{short_id}.md"));
        assert_eq!(second_name, format!("2026-01-15_Flow_{short_id}_2.md"));
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn manifest_reports_counts_and_timestamp() {
        let generated_at = Utc.with_ymd_and_hms(2026, 1, 16, 8, 30, 0).unwrap();
        let manifest = render_manifest(3, 2, generated_at);
        assert!(manifest.contains("Generated: 2026-01-16 08:30:00 UTC"));
        assert!(manifest.contains("Practice logs: 3"));
        assert!(manifest.contains("Photos: 2"));
    }
}
