//! Constants used throughout the HQM core crate.
//!
//! Path and filename constants live here so the file-backed store and its tests agree on the
//! on-disk layout.

use std::time::Duration;

/// Default directory for queue data when no explicit directory is configured.
pub const DEFAULT_QUEUE_DATA_DIR: &str = "queue_data";

/// Directory name for department records.
pub const DEPARTMENTS_DIR_NAME: &str = "departments";

/// Directory name for patient records.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Filename of a stored department record.
pub const DEPARTMENT_FILENAME: &str = "department.yaml";

/// Filename of a stored patient record.
pub const PATIENT_FILENAME: &str = "patient.yaml";

/// Suffix of the temporary file a record is written to before being renamed into place.
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Average consultation length used for wait estimates, in minutes.
pub const DEFAULT_AVERAGE_CONSULTATION_MINUTES: u32 = 10;

/// Upper bound on retries for patient claims and token re-issue after a duplicate.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 32;

/// Default bound on a single datastore call, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// How often a file store call waiting for the store lock checks again.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Maximum length of a department name, in characters.
pub const MAX_DEPARTMENT_NAME_LEN: usize = 100;

/// Maximum length of a token prefix, in characters.
pub const MAX_PREFIX_LEN: usize = 8;

/// Maximum length of a patient name, in characters.
pub const MAX_PATIENT_NAME_LEN: usize = 200;

/// Oldest accepted patient age, in years.
pub const MAX_PATIENT_AGE: u32 = 150;
