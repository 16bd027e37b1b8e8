//! Progress reporting and cancellation for backup runs.
//!
//! # Responsibility
//! - Carry `{stage, current, total}` events from export/import to the caller.
//! - Carry a cooperative cancellation flag checked between units of work.
//!
//! # Invariants
//! - Events within one run are emitted in stage order; counters never go
//!   backwards inside a stage.
//! - Cancellation is only observed at explicit check points, never mid-write.

use super::{BackupError, BackupResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coarse phase of an export or import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStage {
    Preparing,
    CreatingFiles,
    CopyingPhotos,
    Zipping,
    Reading,
    Parsing,
    Importing,
    Done,
}

impl BackupStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::CreatingFiles => "creating_files",
            Self::CopyingPhotos => "copying_photos",
            Self::Zipping => "zipping",
            Self::Reading => "reading",
            Self::Parsing => "parsing",
            Self::Importing => "importing",
            Self::Done => "done",
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProgress {
    pub stage: BackupStage,
    pub current: usize,
    pub total: usize,
}

/// Cloneable cancellation flag shared between the caller and a running job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Progress callback plus cancellation token threaded through one run.
pub struct ProgressReporter<'a> {
    on_progress: Box<dyn FnMut(BackupProgress) + 'a>,
    cancel: CancellationToken,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(on_progress: impl FnMut(BackupProgress) + 'a) -> Self {
        Self {
            on_progress: Box::new(on_progress),
            cancel: CancellationToken::new(),
        }
    }

    /// Reporter that drops every event.
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn report(&mut self, stage: BackupStage, current: usize, total: usize) {
        (self.on_progress)(BackupProgress {
            stage,
            current,
            total,
        });
    }

    /// Returns `Err(Cancelled)` once the caller has requested cancellation.
    pub fn checkpoint(&self) -> BackupResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        Ok(())
    }
}
