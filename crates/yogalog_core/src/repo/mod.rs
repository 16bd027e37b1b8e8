//! Repository layer for practice-journal persistence.
//!
//! # Responsibility
//! - Define the store contract used by the backup engine.
//! - Isolate SQLite query details from backup orchestration.
//!
//! # Invariants
//! - Repository writes enforce `NewPracticeLog::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod practice_repo;
