use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use yogalog_core::db::open_db_in_memory;
use yogalog_core::{
    ArchiveWriter, AsanaEntry, AsanaStatus, BackupError, BackupProgress, BackupStage,
    CancellationToken, FsPhotoSource, NewPracticeLog, PhotoReference, PracticeLogRepository,
    ProgressReporter, RecordId, SqlitePracticeLogRepository,
};
use zip::ZipArchive;

fn seed_morning_flow(conn: &Connection, photo_paths: &[&Path]) -> RecordId {
    let repo = SqlitePracticeLogRepository::try_new(conn).unwrap();
    let mut fields = NewPracticeLog::new(
        "Morning Flow",
        Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap(),
    );
    fields.duration_minutes = 75;
    fields.intensity = 4;
    let id = repo.create_record(&fields).unwrap();
    repo.create_asana_entry(
        id,
        &AsanaEntry::new("Downward Dog", 0).with_status(AsanaStatus::Mastered),
    )
    .unwrap();
    repo.create_asana_entry(id, &AsanaEntry::new("Child's Pose", 1))
        .unwrap();
    for (position, path) in photo_paths.iter().enumerate() {
        let photo = PhotoReference::new(path.to_string_lossy(), position as u32);
        repo.create_photo_entry(id, &photo).unwrap();
    }
    id
}

fn writer(conn: &Connection) -> ArchiveWriter<SqlitePracticeLogRepository<'_>, FsPhotoSource> {
    ArchiveWriter::new(
        SqlitePracticeLogRepository::try_new(conn).unwrap(),
        FsPhotoSource::new(),
    )
}

fn entry_names(path: &Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names = archive.file_names().map(str::to_string).collect::<Vec<_>>();
    names.sort();
    names
}

fn read_entry(path: &Path, name: &str) -> String {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut text = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[test]
fn empty_store_is_rejected_without_writing_a_file() {
    let conn = open_db_in_memory().unwrap();
    let out = tempfile::tempdir().unwrap();

    let err = writer(&conn)
        .export_all(out.path(), &mut ProgressReporter::silent())
        .unwrap_err();

    assert!(matches!(err, BackupError::EmptyStore));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn export_writes_documents_photos_and_manifest() {
    let conn = open_db_in_memory().unwrap();
    let photos = tempfile::tempdir().unwrap();
    let pose = photos.path().join("pose.jpg");
    fs::write(&pose, b"\xFF\xD8jpeg-bytes").unwrap();
    let id = seed_morning_flow(&conn, &[pose.as_path()]);

    let out = tempfile::tempdir().unwrap();
    let summary = writer(&conn)
        .export_all(out.path(), &mut ProgressReporter::silent())
        .unwrap();

    assert_eq!(summary.record_count, 1);
    assert_eq!(summary.photo_count, 1);
    assert_eq!(summary.skipped_photos, 0);
    let file_name = summary.path.file_name().unwrap().to_string_lossy();
    assert!(file_name.starts_with("yoga_logs_backup_"));
    assert!(file_name.ends_with(".zip"));

    let photo_name = format!("Photos/2026-01-15_{id}_1.jpg");
    let names = entry_names(&summary.path);
    assert!(names.contains(&"README.md".to_string()));
    assert!(names.contains(&"Yoga_Logs/2026-01-15_Morning_Flow.md".to_string()));
    assert!(names.contains(&photo_name));

    let document = read_entry(&summary.path, "Yoga_Logs/2026-01-15_Morning_Flow.md");
    assert!(document.starts_with("# Morning Flow\n"));
    assert!(document.contains("**Duration:** 1h 15m"));
    assert!(document.contains(&format!("![Photo 1](../{photo_name})")));

    let readme = read_entry(&summary.path, "README.md");
    assert!(readme.contains("Practice logs: 1"));
    assert!(readme.contains("Photos: 1"));
}

#[test]
fn missing_photo_is_omitted_from_archive_and_document() {
    let conn = open_db_in_memory().unwrap();
    let photos = tempfile::tempdir().unwrap();
    let present = photos.path().join("present.jpg");
    fs::write(&present, b"jpeg").unwrap();
    let missing = photos.path().join("deleted.jpg");
    seed_morning_flow(&conn, &[missing.as_path(), present.as_path()]);

    let out = tempfile::tempdir().unwrap();
    let summary = writer(&conn)
        .export_to(&out.path().join("backup.zip"), &mut ProgressReporter::silent())
        .unwrap();

    assert_eq!(summary.photo_count, 1);
    assert_eq!(summary.skipped_photos, 1);
    let photo_entries = entry_names(&summary.path)
        .into_iter()
        .filter(|name| name.starts_with("Photos/") && name.ends_with(".jpg"))
        .count();
    assert_eq!(photo_entries, 1);

    let document = read_entry(&summary.path, "Yoga_Logs/2026-01-15_Morning_Flow.md");
    let photo_lines = document
        .lines()
        .filter(|line| line.starts_with("![Photo"))
        .count();
    assert_eq!(photo_lines, 1);
}

#[test]
fn same_title_on_same_day_yields_distinct_documents() {
    let conn = open_db_in_memory().unwrap();
    seed_morning_flow(&conn, &[]);
    seed_morning_flow(&conn, &[]);

    let out = tempfile::tempdir().unwrap();
    let summary = writer(&conn)
        .export_to(&out.path().join("backup.zip"), &mut ProgressReporter::silent())
        .unwrap();

    assert_eq!(summary.record_count, 2);
    let documents = entry_names(&summary.path)
        .into_iter()
        .filter(|name| name.starts_with("Yoga_Logs/") && name.ends_with(".md"))
        .collect::<Vec<_>>();
    assert_eq!(documents.len(), 2);
}

#[test]
fn progress_runs_through_export_stages_in_order() {
    let conn = open_db_in_memory().unwrap();
    seed_morning_flow(&conn, &[]);

    let mut events: Vec<BackupProgress> = Vec::new();
    let out = tempfile::tempdir().unwrap();
    {
        let mut reporter = ProgressReporter::new(|progress| events.push(progress));
        writer(&conn)
            .export_to(&out.path().join("backup.zip"), &mut reporter)
            .unwrap();
    }

    let mut stages = events.iter().map(|event| event.stage).collect::<Vec<_>>();
    stages.dedup();
    assert_eq!(
        stages,
        [
            BackupStage::Preparing,
            BackupStage::CreatingFiles,
            BackupStage::CopyingPhotos,
            BackupStage::Zipping,
            BackupStage::Done,
        ]
    );
    assert!(events.iter().all(|event| event.current <= event.total));

    // One planned document, then the document plus the manifest are written.
    let planned = events
        .iter()
        .filter(|event| event.stage == BackupStage::CreatingFiles)
        .collect::<Vec<_>>();
    assert_eq!(planned.last().map(|event| (event.current, event.total)), Some((1, 1)));
    let written = events
        .iter()
        .filter(|event| event.stage == BackupStage::Zipping)
        .collect::<Vec<_>>();
    assert_eq!(written.last().map(|event| (event.current, event.total)), Some((2, 2)));
}

#[test]
fn cancelled_export_leaves_no_archive_behind() {
    let conn = open_db_in_memory().unwrap();
    seed_morning_flow(&conn, &[]);
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("backup.zip");

    let token = CancellationToken::new();
    let cancel_on_zip = token.clone();
    let mut reporter = ProgressReporter::new(move |progress: BackupProgress| {
        if progress.stage == BackupStage::CopyingPhotos {
            cancel_on_zip.cancel();
        }
    })
    .with_cancellation(token);

    let err = writer(&conn).export_to(&target, &mut reporter).unwrap_err();

    assert!(matches!(err, BackupError::Cancelled));
    assert!(!target.exists());
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn relative_photo_paths_resolve_against_base_dir() {
    let conn = open_db_in_memory().unwrap();
    let photos = tempfile::tempdir().unwrap();
    fs::write(photos.path().join("pose.jpg"), b"jpeg").unwrap();
    seed_morning_flow(&conn, &[Path::new("pose.jpg")]);

    let out = tempfile::tempdir().unwrap();
    let summary = ArchiveWriter::new(
        SqlitePracticeLogRepository::try_new(&conn).unwrap(),
        FsPhotoSource::with_base_dir(photos.path()),
    )
    .export_to(&out.path().join("backup.zip"), &mut ProgressReporter::silent())
    .unwrap();

    assert_eq!(summary.photo_count, 1);
    assert_eq!(summary.skipped_photos, 0);
}
