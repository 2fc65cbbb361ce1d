//! Record identifiers and sharded-path utilities.
//!
//! Departments and patients are addressed by a *canonical* UUID representation:
//! **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - A wrapper type ([`RecordId`]) that guarantees the canonical format once constructed.
//! - Sharding logic to derive a record's directory under a file-backed datastore.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Externally supplied identifiers (REST paths, CLI arguments) must already be canonical.
//! Use [`RecordId::parse`] to validate them.
//!
//! ## Sharded directory layout
//! For a canonical id `u`, records are stored under
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`, for example
//! `queue_data/patients/55/0e/550e8400e29b41d4a716446655440000/`.

mod record_id;

pub use record_id::{RecordId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
