//! Archive reader: restores practice logs from a backup archive.
//!
//! # Responsibility
//! - Open an archive, parse every document under `Yoga_Logs/`, and merge the
//!   parsed practice logs into the store.
//! - Copy referenced photos from `Photos/` into managed storage.
//!
//! # Invariants
//! - Duplicate key is `(title, YYYY-MM-DD)`; an existing match always wins and
//!   no field-level merge is attempted.
//! - The whole run is one store transaction; a failing record is rolled back
//!   on its own and reported in `ImportResult::errors`.
//! - Cancellation or a fatal error rolls back the run and removes every photo
//!   file written by it.

use super::parser::{parse_markdown, ParsedPracticeLog};
use super::photo::PhotoSink;
use super::progress::{BackupStage, ProgressReporter};
use super::{BackupError, BackupResult, LOGS_FOLDER, PHOTOS_FOLDER};
use crate::model::practice_log::{PhotoReference, RecordId};
use crate::repo::practice_repo::PracticeLogRepository;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Instant;
use zip::ZipArchive;

/// Summary of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported_count: usize,
    pub skipped_count: usize,
    /// One `"<title>: <message>"` entry per record that failed to import.
    pub errors: Vec<String>,
    pub photos_copied: usize,
    pub photos_failed: usize,
}

impl ImportResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

struct ArchiveIndex {
    documents: Vec<(String, usize)>,
    photos: HashMap<String, usize>,
}

/// Imports archives into the store.
pub struct ArchiveReader<R: PracticeLogRepository, S: PhotoSink> {
    repo: R,
    sink: S,
}

impl<R: PracticeLogRepository, S: PhotoSink> ArchiveReader<R, S> {
    pub fn new(repo: R, sink: S) -> Self {
        Self { repo, sink }
    }

    /// Imports the archive stored at `path`.
    ///
    /// # Errors
    /// - `InvalidArchive` when the file is missing or not a zip archive.
    /// - `NoRecordsFound` when no document exists under `Yoga_Logs/`.
    /// - `Cancelled` when the reporter's token is cancelled.
    /// - `Repo` when the enclosing transaction itself fails.
    pub fn import_all(
        &self,
        path: &Path,
        reporter: &mut ProgressReporter<'_>,
    ) -> BackupResult<ImportResult> {
        let started_at = Instant::now();
        info!(
            "event=backup_import module=backup status=start path={}",
            path.display()
        );

        reporter.report(BackupStage::Reading, 0, 1);
        let archive = File::open(path)
            .map_err(|err| BackupError::InvalidArchive(err.to_string()))
            .and_then(|file| {
                ZipArchive::new(BufReader::new(file))
                    .map_err(|err| BackupError::InvalidArchive(err.to_string()))
            });
        let outcome = archive.and_then(|mut archive| self.import_from(&mut archive, reporter));

        match outcome {
            Ok(result) => {
                info!(
                    "event=backup_import module=backup status=ok duration_ms={} imported={} skipped={} errors={} photos_copied={} photos_failed={}",
                    started_at.elapsed().as_millis(),
                    result.imported_count,
                    result.skipped_count,
                    result.errors.len(),
                    result.photos_copied,
                    result.photos_failed
                );
                Ok(result)
            }
            Err(err) => {
                error!(
                    "event=backup_import module=backup status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Imports from an already opened archive (any `Read + Seek` source).
    pub fn import_from<A: Read + Seek>(
        &self,
        archive: &mut ZipArchive<A>,
        reporter: &mut ProgressReporter<'_>,
    ) -> BackupResult<ImportResult> {
        reporter.checkpoint()?;
        let index = index_archive(archive)?;
        if index.documents.is_empty() {
            return Err(BackupError::NoRecordsFound);
        }
        reporter.report(BackupStage::Reading, 1, 1);

        let total_documents = index.documents.len();
        let mut parsed = Vec::with_capacity(total_documents);
        reporter.report(BackupStage::Parsing, 0, total_documents);
        for (position, (name, entry_index)) in index.documents.iter().enumerate() {
            reporter.checkpoint()?;
            match read_document(archive, *entry_index) {
                Ok(text) => match parse_markdown(&text) {
                    Some(document) => {
                        if !document.is_clean() {
                            debug!(
                                "event=backup_parse module=backup status=recovered document={} recoveries={:?}",
                                name, document.recoveries
                            );
                        }
                        parsed.push(document);
                    }
                    None => debug!(
                        "event=backup_parse module=backup status=dropped document={}",
                        name
                    ),
                },
                Err(err) => warn!(
                    "event=backup_parse module=backup status=unreadable document={} error={}",
                    name, err
                ),
            }
            reporter.report(BackupStage::Parsing, position + 1, total_documents);
        }

        let mut written_photos: Vec<PathBuf> = Vec::new();
        let outcome = self.repo.run_in_transaction(|repo| {
            self.apply_documents(repo, archive, &index, &parsed, reporter, &mut written_photos)
        });
        if outcome.is_err() {
            self.remove_photos(&written_photos);
        }
        let result = outcome?;
        reporter.report(BackupStage::Done, result.imported_count, parsed.len());
        Ok(result)
    }

    fn apply_documents<A: Read + Seek>(
        &self,
        repo: &R,
        archive: &mut ZipArchive<A>,
        index: &ArchiveIndex,
        documents: &[ParsedPracticeLog],
        reporter: &mut ProgressReporter<'_>,
        written_photos: &mut Vec<PathBuf>,
    ) -> BackupResult<ImportResult> {
        let mut result = ImportResult::default();
        let total = documents.len();
        let total_photos = documents
            .iter()
            .map(|document| document.photo_files.len())
            .sum::<usize>();
        let mut photos_seen = 0;

        reporter.report(BackupStage::Importing, 0, total);
        for (position, document) in documents.iter().enumerate() {
            reporter.checkpoint()?;
            let title = document.fields.title.as_str();
            let day = document.fields.day_prefix();

            match repo.find_by_duplicate_key(title, &day) {
                Ok(Some(existing)) => {
                    debug!(
                        "event=backup_import_record module=backup status=duplicate existing_id={}",
                        existing.id
                    );
                    result.skipped_count += 1;
                }
                Ok(None) => {
                    let mut record_photos = Vec::new();
                    let outcome = repo.run_isolated(|repo| {
                        self.apply_document(
                            repo,
                            archive,
                            index,
                            document,
                            reporter,
                            &mut record_photos,
                            &mut photos_seen,
                            total_photos,
                        )
                    });
                    match outcome {
                        Ok((copied, failed)) => {
                            result.imported_count += 1;
                            result.photos_copied += copied;
                            result.photos_failed += failed;
                            written_photos.extend(record_photos);
                        }
                        Err(BackupError::Cancelled) => {
                            written_photos.extend(record_photos);
                            return Err(BackupError::Cancelled);
                        }
                        Err(err) => {
                            warn!(
                                "event=backup_import_record module=backup status=error error={}",
                                err
                            );
                            self.remove_photos(&record_photos);
                            result.errors.push(format!("{title}: {err}"));
                        }
                    }
                }
                Err(err) => result.errors.push(format!("{title}: {err}")),
            }
            reporter.report(BackupStage::Importing, position + 1, total);
        }

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_document<A: Read + Seek>(
        &self,
        repo: &R,
        archive: &mut ZipArchive<A>,
        index: &ArchiveIndex,
        document: &ParsedPracticeLog,
        reporter: &mut ProgressReporter<'_>,
        record_photos: &mut Vec<PathBuf>,
        photos_seen: &mut usize,
        total_photos: usize,
    ) -> BackupResult<(usize, usize)> {
        let record_id = repo.create_record(&document.fields)?;
        for asana in &document.asanas {
            repo.create_asana_entry(record_id, asana)?;
        }

        let import_stamp = Utc::now().timestamp_millis();
        let mut copied = 0;
        let mut failed = 0;
        for (photo_index, file_name) in document.photo_files.iter().enumerate() {
            reporter.checkpoint()?;
            let managed_name = managed_photo_name(record_id, photo_index + 1, import_stamp);
            match copy_photo(archive, index, file_name, &managed_name, &self.sink) {
                Ok(path) => {
                    record_photos.push(path.clone());
                    let photo = PhotoReference::new(
                        path.to_string_lossy(),
                        u32::try_from(copied).unwrap_or(u32::MAX),
                    );
                    repo.create_photo_entry(record_id, &photo)?;
                    copied += 1;
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        "event=backup_import_photo module=backup status=skipped record_id={} photo={} error={}",
                        record_id, file_name, err
                    );
                }
            }
            *photos_seen += 1;
            reporter.report(BackupStage::CopyingPhotos, *photos_seen, total_photos);
        }
        Ok((copied, failed))
    }

    fn remove_photos(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(err) = self.sink.remove(path) {
                warn!(
                    "event=photo_cleanup module=backup status=error path={} error={}",
                    path.display(),
                    err
                );
            }
        }
    }
}

/// Managed storage name `<recordId>_<index>_<importTimestampMillis>.jpg`.
pub fn managed_photo_name(record_id: RecordId, index: usize, import_stamp: i64) -> String {
    format!("{record_id}_{index}_{import_stamp}.jpg")
}

fn index_archive<A: Read + Seek>(archive: &mut ZipArchive<A>) -> BackupResult<ArchiveIndex> {
    let mut documents = Vec::new();
    let mut photos = HashMap::new();
    for entry_index in 0..archive.len() {
        let entry = archive
            .by_index(entry_index)
            .map_err(|err| BackupError::InvalidArchive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");
        let mut components = name.split('/').filter(|part| !part.is_empty());
        let Some(file_name) = components.next_back() else {
            continue;
        };
        if file_name.starts_with('.') || name.contains("__MACOSX") {
            continue;
        }
        let Some(folder) = components.next_back() else {
            continue;
        };
        if folder == LOGS_FOLDER && file_name.to_ascii_lowercase().ends_with(".md") {
            documents.push((name.clone(), entry_index));
        } else if folder == PHOTOS_FOLDER {
            photos.entry(file_name.to_string()).or_insert(entry_index);
        }
    }
    documents.sort();
    Ok(ArchiveIndex { documents, photos })
}

fn read_document<A: Read + Seek>(archive: &mut ZipArchive<A>, entry_index: usize) -> io::Result<String> {
    let mut entry = archive.by_index(entry_index).map_err(io::Error::other)?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn copy_photo<A: Read + Seek, S: PhotoSink>(
    archive: &mut ZipArchive<A>,
    index: &ArchiveIndex,
    file_name: &str,
    managed_name: &str,
    sink: &S,
) -> io::Result<PathBuf> {
    let entry_index = index.photos.get(file_name).copied().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("`{PHOTOS_FOLDER}/{file_name}` is not in the archive"),
        )
    })?;
    let mut entry = archive.by_index(entry_index).map_err(io::Error::other)?;
    sink.write_new(managed_name, &mut entry)
}
