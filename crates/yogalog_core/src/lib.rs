//! Core domain logic for Yoga Log.
//! This crate owns the practice-log store and the backup/restore engine.

pub mod backup;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use backup::progress::{BackupProgress, BackupStage, CancellationToken, ProgressReporter};
pub use backup::reader::{ArchiveReader, ImportResult};
pub use backup::writer::{ArchiveWriter, ExportOptions, ExportSummary};
pub use backup::photo::{FsPhotoSource, ManagedPhotoDir, PhotoSink, PhotoSource};
pub use backup::{BackupError, BackupResult};
pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget,
};
pub use model::practice_log::{
    AsanaEntry, AsanaStatus, NewPracticeLog, PhotoReference, PracticeLog, PracticeLogRecord,
    PracticeLogValidationError, RecordId,
};
pub use repo::practice_repo::{
    PracticeLogRepository, RepoError, RepoResult, SqlitePracticeLogRepository,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
