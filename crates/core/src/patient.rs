//! Patient records and their lifecycle.
//!
//! A patient moves through a small state machine:
//!
//! ```text
//! waiting --call next--> serving --complete--> completed
//!    |
//!    +--------cancel--------> cancelled
//! ```
//!
//! There is no generic status setter. Every transition is validated by
//! [`PatientStatus::check_transition`] and applied by the datastore as a conditional update.

use crate::constants::{MAX_PATIENT_AGE, MAX_PATIENT_NAME_LEN};
use crate::{NonEmptyText, QueueError, QueueResult, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Urgency class of a patient. Declaration order is the sort order: `Emergency > Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    Emergency,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" => Ok(Priority::Normal),
            "emergency" => Ok(Priority::Emergency),
            other => Err(QueueError::InvalidInput(format!(
                "unknown priority '{}' (expected 'normal' or 'emergency')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientStatus {
    #[default]
    Waiting,
    Serving,
    Completed,
    Cancelled,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Waiting => "waiting",
            PatientStatus::Serving => "serving",
            PatientStatus::Completed => "completed",
            PatientStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled patients never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PatientStatus::Completed | PatientStatus::Cancelled)
    }

    /// Waiting and serving patients still belong to a live queue.
    pub fn is_active(&self) -> bool {
        matches!(self, PatientStatus::Waiting | PatientStatus::Serving)
    }

    /// Validates a single step of the patient state machine.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::IllegalTransition` for any step other than
    /// `waiting → serving`, `serving → completed` or `waiting → cancelled`.
    pub fn check_transition(self, to: PatientStatus) -> QueueResult<()> {
        use PatientStatus::*;
        match (self, to) {
            (Waiting, Serving) | (Serving, Completed) | (Waiting, Cancelled) => Ok(()),
            (from, to) => Err(QueueError::IllegalTransition { from, to }),
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "waiting" => Ok(PatientStatus::Waiting),
            "serving" => Ok(PatientStatus::Serving),
            "completed" => Ok(PatientStatus::Completed),
            "cancelled" => Ok(PatientStatus::Cancelled),
            other => Err(QueueError::InvalidInput(format!(
                "unknown status '{}' (expected waiting, serving, completed or cancelled)",
                other
            ))),
        }
    }
}

/// A stored patient record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: RecordId,
    pub name: NonEmptyText,
    pub age: u32,
    /// Department name at registration time.
    pub department: String,
    pub token_number: String,
    /// Counter value embedded in `token_number`.
    pub token_sequence: u64,
    pub priority: Priority,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Advisory wait in minutes, computed when the patient registered.
    #[serde(default)]
    pub estimated_wait_time: u32,
}

impl Patient {
    /// Applies a validated transition to this record, stamping the matching timestamp.
    ///
    /// Datastores call this while holding whatever guarantees atomicity for them.
    pub fn apply_transition(&mut self, to: PatientStatus, at: DateTime<Utc>) -> QueueResult<()> {
        self.status.check_transition(to)?;
        self.status = to;
        match to {
            PatientStatus::Serving => self.called_at = Some(at),
            PatientStatus::Completed => self.completed_at = Some(at),
            PatientStatus::Cancelled => self.cancelled_at = Some(at),
            PatientStatus::Waiting => {}
        }
        Ok(())
    }
}

/// Registration input, as received from an API or CLI caller.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub age: i64,
    pub department: String,
    /// `None` means `normal`.
    pub priority: Option<String>,
}

/// Registration input after validation. Building one never touches the datastore.
#[derive(Debug, Clone)]
pub struct ValidatedPatient {
    pub name: NonEmptyText,
    pub age: u32,
    pub department: NonEmptyText,
    pub priority: Priority,
}

impl NewPatient {
    /// Validates every field.
    ///
    /// # Errors
    ///
    /// Returns a validation-kind `QueueError` for a blank or overlong name, an age outside
    /// `1..=150`, a blank department, or an unknown priority.
    pub fn validate(self) -> QueueResult<ValidatedPatient> {
        let name = NonEmptyText::with_max_len(&self.name, MAX_PATIENT_NAME_LEN)?;

        if self.age < 1 || self.age > i64::from(MAX_PATIENT_AGE) {
            return Err(QueueError::InvalidInput(format!(
                "age must be between 1 and {}, got {}",
                MAX_PATIENT_AGE, self.age
            )));
        }
        let age = u32::try_from(self.age)
            .map_err(|_| QueueError::InvalidInput(format!("invalid age {}", self.age)))?;

        let department = NonEmptyText::new(&self.department)?;

        let priority = match self.priority.as_deref().map(str::trim) {
            None | Some("") => Priority::Normal,
            Some(p) => p.parse()?,
        };

        Ok(ValidatedPatient {
            name,
            age,
            department,
            priority,
        })
    }
}
