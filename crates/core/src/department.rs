//! Department records.
//!
//! A department owns the token counter for its queue. The counter is only ever advanced by the
//! token issuer through the datastore's atomic increment; department edits never
//! touch it.

use crate::constants::{MAX_DEPARTMENT_NAME_LEN, MAX_PREFIX_LEN};
use crate::{NonEmptyText, QueueError, QueueResult, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: RecordId,
    pub name: NonEmptyText,
    pub prefix: NonEmptyText,
    pub current_token: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Department {
    /// Builds a new department with a zero counter.
    ///
    /// # Errors
    ///
    /// Returns a validation-kind error if the name or prefix is invalid.
    pub fn new(name: &str, prefix: &str) -> QueueResult<Self> {
        Ok(Self {
            id: RecordId::new(),
            name: validate_department_name(name)?,
            prefix: validate_prefix(prefix)?,
            current_token: 0,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}

/// Partial update of a department's editable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentChanges {
    pub name: Option<NonEmptyText>,
    pub prefix: Option<NonEmptyText>,
    pub is_active: Option<bool>,
}

impl DepartmentChanges {
    /// Validates raw update input. Absent fields stay unchanged.
    pub fn parse(
        name: Option<&str>,
        prefix: Option<&str>,
        is_active: Option<bool>,
    ) -> QueueResult<Self> {
        Ok(Self {
            name: name.map(validate_department_name).transpose()?,
            prefix: prefix.map(validate_prefix).transpose()?,
            is_active,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.prefix.is_none() && self.is_active.is_none()
    }

    /// Applies the changes to `department`, leaving the counter untouched.
    pub fn apply_to(&self, department: &mut Department) {
        if let Some(name) = &self.name {
            department.name = name.clone();
        }
        if let Some(prefix) = &self.prefix {
            department.prefix = prefix.clone();
        }
        if let Some(is_active) = self.is_active {
            department.is_active = is_active;
        }
    }
}

fn validate_department_name(name: &str) -> QueueResult<NonEmptyText> {
    Ok(NonEmptyText::with_max_len(name, MAX_DEPARTMENT_NAME_LEN)?)
}

/// Validates a token prefix.
///
/// Prefixes are 1 to 8 ASCII letters or digits. Hyphens are refused so a token always splits
/// unambiguously into prefix and sequence.
pub fn validate_prefix(prefix: &str) -> QueueResult<NonEmptyText> {
    let prefix = NonEmptyText::with_max_len(prefix, MAX_PREFIX_LEN)?;

    if !prefix.as_str().bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(QueueError::InvalidInput(format!(
            "prefix '{}' may only contain ASCII letters and digits",
            prefix
        )));
    }

    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_department_starts_at_zero() {
        let dept = Department::new("Cardiology", "C").unwrap();
        assert_eq!(dept.current_token, 0);
        assert!(dept.is_active);
        assert_eq!(dept.name, "Cardiology");
        assert_eq!(dept.prefix, "C");
    }

    #[test]
    fn test_prefix_validation() {
        assert!(validate_prefix("ORTH").is_ok());
        assert!(validate_prefix("C2").is_ok());
        assert!(matches!(validate_prefix("C-1"), Err(QueueError::InvalidInput(_))));
        assert!(matches!(validate_prefix("ÖR"), Err(QueueError::InvalidInput(_))));
        assert!(matches!(validate_prefix(""), Err(QueueError::Text(_))));
        assert!(matches!(
            validate_prefix("ABCDEFGHI"),
            Err(QueueError::Text(hqm_types::TextError::TooLong { max: 8 }))
        ));
    }

    #[test]
    fn test_changes_never_touch_counter() {
        let mut dept = Department::new("Cardiology", "C").unwrap();
        dept.current_token = 41;

        let changes = DepartmentChanges::parse(Some("Cardiac Care"), Some("CC"), Some(false))
            .unwrap();
        changes.apply_to(&mut dept);

        assert_eq!(dept.name, "Cardiac Care");
        assert_eq!(dept.prefix, "CC");
        assert!(!dept.is_active);
        assert_eq!(dept.current_token, 41);
    }

    #[test]
    fn test_empty_changes() {
        let changes = DepartmentChanges::parse(None, None, None).unwrap();
        assert!(changes.is_empty());
        assert!(DepartmentChanges::parse(Some("  "), None, None).is_err());
    }
}
