//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level backup/restore functions to Dart via FRB.
//! - Flatten core results and errors into plain response envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - An absent archive path on import means the user dismissed the file
//!   picker; it is reported as `cancelled`, not as an error.

use log::info;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use yogalog_core::db::open_db;
use yogalog_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ArchiveReader, ArchiveWriter, BackupError, FsPhotoSource, ImportResult, ManagedPhotoDir,
    ProgressReporter, SqlitePracticeLogRepository,
};

const DEFAULT_DB_FILE_NAME: &str = "yogalog.sqlite3";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Result envelope for backup export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBackupResponse {
    pub ok: bool,
    /// Absolute path of the written archive on success.
    pub archive_path: Option<String>,
    pub record_count: u32,
    pub photo_count: u32,
    /// Stable error code (`empty_store`, `io`, ...) on failure.
    pub error_code: Option<String>,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

/// Result envelope for backup import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBackupResponse {
    pub ok: bool,
    /// True when no archive was chosen.
    pub cancelled: bool,
    pub imported_count: u32,
    pub skipped_count: u32,
    pub photos_copied: u32,
    pub photos_failed: u32,
    /// Per-record failures formatted as `<title>: <message>`.
    pub errors: Vec<String>,
    pub error_code: Option<String>,
    pub message: String,
}

impl ImportBackupResponse {
    fn cancelled() -> Self {
        Self {
            ok: false,
            cancelled: true,
            imported_count: 0,
            skipped_count: 0,
            photos_copied: 0,
            photos_failed: 0,
            errors: Vec::new(),
            error_code: None,
            message: "Import cancelled.".to_string(),
        }
    }

    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            cancelled: code == "cancelled",
            error_code: Some(code.to_string()),
            message: message.into(),
            ..Self::cancelled()
        }
    }

    fn from_result(result: ImportResult) -> Self {
        let message = if result.has_errors() {
            format!(
                "Imported {}, skipped {}, failed {}.",
                result.imported_count,
                result.skipped_count,
                result.errors.len()
            )
        } else {
            format!(
                "Imported {}, skipped {}.",
                result.imported_count, result.skipped_count
            )
        };
        Self {
            ok: true,
            cancelled: false,
            imported_count: to_u32(result.imported_count),
            skipped_count: to_u32(result.skipped_count),
            photos_copied: to_u32(result.photos_copied),
            photos_failed: to_u32(result.photos_failed),
            errors: result.errors,
            error_code: None,
            message,
        }
    }
}

/// Exports every practice log into a new archive under `out_dir`.
///
/// Relative photo paths stored in the journal resolve against `photo_dir`.
///
/// # FFI contract
/// - Blocking call; run it off the UI thread.
/// - Never panics.
pub fn export_backup(out_dir: String, photo_dir: Option<String>) -> ExportBackupResponse {
    let db_path = resolve_db_path();
    let outcome = with_repo(&db_path, |repo| {
        let source = match photo_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => FsPhotoSource::with_base_dir(dir),
            _ => FsPhotoSource::new(),
        };
        let writer = ArchiveWriter::new(repo, source);
        writer.export_all(Path::new(out_dir.trim()), &mut ProgressReporter::silent())
    });

    match outcome {
        Ok(summary) => ExportBackupResponse {
            ok: true,
            archive_path: Some(summary.path.to_string_lossy().into_owned()),
            record_count: to_u32(summary.record_count),
            photo_count: to_u32(summary.photo_count),
            error_code: None,
            message: format!("Exported {} practice log(s).", summary.record_count),
        },
        Err(err) => ExportBackupResponse {
            ok: false,
            archive_path: None,
            record_count: 0,
            photo_count: 0,
            error_code: Some(err.code().to_string()),
            message: format!("export_backup failed: {err}"),
        },
    }
}

/// Imports an archive chosen by the user.
///
/// Input semantics:
/// - `archive_path`: `None` or blank when the user dismissed the picker.
/// - `photo_dir`: managed directory that receives imported photos.
///
/// # FFI contract
/// - Blocking call; run it off the UI thread.
/// - Never panics.
pub fn import_backup(archive_path: Option<String>, photo_dir: String) -> ImportBackupResponse {
    let archive_path = match archive_path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => {
            info!("event=backup_import module=ffi status=cancelled reason=no_selection");
            return ImportBackupResponse::cancelled();
        }
    };

    let db_path = resolve_db_path();
    let outcome = with_repo(&db_path, |repo| {
        let reader = ArchiveReader::new(repo, ManagedPhotoDir::new(photo_dir.trim()));
        reader.import_all(&archive_path, &mut ProgressReporter::silent())
    });

    match outcome {
        Ok(result) => ImportBackupResponse::from_result(result),
        Err(err) => {
            ImportBackupResponse::failure(err.code(), format!("import_backup failed: {err}"))
        }
    }
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("YOGALOG_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
        })
        .clone()
}

fn with_repo<T>(
    db_path: &Path,
    f: impl FnOnce(SqlitePracticeLogRepository<'_>) -> Result<T, BackupError>,
) -> Result<T, BackupError> {
    let conn = open_db(db_path).map_err(|err| BackupError::Repo(err.into()))?;
    let repo = SqlitePracticeLogRepository::try_new(&conn)?;
    f(repo)
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, export_backup, import_backup, init_logging, ping, resolve_db_path, to_u32,
        ImportBackupResponse,
    };
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};
    use yogalog_core::db::open_db;
    use yogalog_core::{
        ImportResult, NewPracticeLog, PracticeLogRepository, SqlitePracticeLogRepository,
    };

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn import_without_selection_is_cancelled_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let photo_dir = dir.path().to_string_lossy().into_owned();

        for selection in [None, Some("   ".to_string())] {
            let response = import_backup(selection, photo_dir.clone());
            assert!(response.cancelled);
            assert!(!response.ok);
            assert!(response.error_code.is_none());
            assert!(response.errors.is_empty());
        }
    }

    #[test]
    fn import_of_missing_archive_reports_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.zip");

        let response = import_backup(
            Some(missing.to_string_lossy().into_owned()),
            dir.path().join("photos").to_string_lossy().into_owned(),
        );
        assert!(!response.ok);
        assert!(!response.cancelled);
        assert_eq!(response.error_code.as_deref(), Some("invalid_archive"));
    }

    #[test]
    fn import_response_carries_counts_and_errors() {
        let response = ImportBackupResponse::from_result(ImportResult {
            imported_count: 3,
            skipped_count: 1,
            errors: vec!["Evening Flow: invalid data".to_string()],
            photos_copied: 2,
            photos_failed: 0,
        });
        assert!(response.ok);
        assert_eq!(response.imported_count, 3);
        assert_eq!(response.skipped_count, 1);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.message, "Imported 3, skipped 1, failed 1.");
    }

    #[test]
    fn clean_import_message_omits_failures() {
        let response = ImportBackupResponse::from_result(ImportResult {
            imported_count: 2,
            skipped_count: 0,
            ..ImportResult::default()
        });
        assert!(response.ok);
        assert!(response.errors.is_empty());
        assert_eq!(response.message, "Imported 2, skipped 0.");
    }

    #[test]
    fn export_writes_archive_for_seeded_store() {
        let conn = open_db(resolve_db_path()).expect("open db");
        let repo = SqlitePracticeLogRepository::try_new(&conn).expect("repo init");
        repo.create_record(&NewPracticeLog::new(
            unique_token("ffi-export"),
            chrono::Utc::now(),
        ))
        .expect("seed record");

        let out = tempfile::tempdir().unwrap();
        let response = export_backup(out.path().to_string_lossy().into_owned(), None);
        assert!(response.ok, "{}", response.message);
        assert!(response.record_count >= 1);
        let archive_path = response.archive_path.expect("archive path on success");
        assert!(Path::new(&archive_path).is_file());
    }

    #[test]
    fn counts_saturate_at_u32_max() {
        assert_eq!(to_u32(7), 7);
        assert_eq!(to_u32(usize::MAX), u32::MAX);
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }
}
