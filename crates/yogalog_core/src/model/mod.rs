//! Practice-journal domain model.
//!
//! # Responsibility
//! - Define canonical data structures shared by storage and the backup codec.
//!
//! # Invariants
//! - Every practice log is identified by a stable `RecordId`.
//! - Nested collections are ordered by their zero-based `position`.
//!
//! # See also
//! - `crate::repo::practice_repo` for the persisted shape.

pub mod practice_log;
