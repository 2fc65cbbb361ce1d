use crate::patient::PatientStatus;
use std::time::Duration;

/// Coarse classification of a [`QueueError`], used by API layers to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The referenced department or patient does not exist.
    NotFound,
    /// Uniqueness violation, busy department, or exhausted retries on a contended write.
    Conflict,
    /// The input or the requested transition is invalid. Nothing was mutated.
    Validation,
    /// The datastore is unavailable or timed out. Safe to retry.
    Transient,
    /// Stored data could not be decoded, or a background task failed.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("department not found: {0}")]
    DepartmentNotFound(String),
    #[error("patient not found: {0}")]
    PatientNotFound(String),

    #[error("department already exists: {0}")]
    DuplicateDepartment(String),
    #[error("token prefix already in use: {0}")]
    DuplicatePrefix(String),
    #[error("token number already issued: {0}")]
    DuplicateToken(String),
    #[error("department {department} is already serving {token}")]
    DepartmentBusy { department: String, token: String },
    #[error("department {0} still has waiting or serving patients")]
    DepartmentHasActivePatients(String),
    #[error("{operation} did not settle after {attempts} attempts")]
    Contention {
        operation: &'static str,
        attempts: u32,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cannot move patient from {from} to {to}")]
    IllegalTransition {
        from: PatientStatus,
        to: PatientStatus,
    },
    #[error("department {0} is not accepting registrations")]
    DepartmentInactive(String),
    #[error("invalid text: {0}")]
    Text(#[from] hqm_types::TextError),
    #[error("invalid identifier: {0}")]
    Uuid(#[from] hqm_uuid::UuidError),

    #[error("datastore call timed out after {0:?}")]
    Timeout(Duration),
    #[error("datastore unavailable: {0}")]
    StoreUnavailable(String),
    #[error("failed to create storage directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to read record: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write record: {0}")]
    FileWrite(std::io::Error),

    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::DepartmentNotFound(_) | QueueError::PatientNotFound(_) => {
                ErrorKind::NotFound
            }
            QueueError::DuplicateDepartment(_)
            | QueueError::DuplicatePrefix(_)
            | QueueError::DuplicateToken(_)
            | QueueError::DepartmentBusy { .. }
            | QueueError::DepartmentHasActivePatients(_)
            | QueueError::Contention { .. } => ErrorKind::Conflict,
            QueueError::InvalidInput(_)
            | QueueError::IllegalTransition { .. }
            | QueueError::DepartmentInactive(_)
            | QueueError::Text(_)
            | QueueError::Uuid(_) => ErrorKind::Validation,
            QueueError::Timeout(_)
            | QueueError::StoreUnavailable(_)
            | QueueError::DirCreation(_)
            | QueueError::FileRead(_)
            | QueueError::FileWrite(_) => ErrorKind::Transient,
            QueueError::YamlSerialization(_)
            | QueueError::YamlDeserialization(_)
            | QueueError::TaskJoin(_) => ErrorKind::Internal,
        }
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
