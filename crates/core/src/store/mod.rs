//! Datastore abstraction.
//!
//! The queue engine and services only ever talk to a [`QueueStore`]. Besides plain
//! create/read/update/delete, a store offers three updates that must be atomic:
//!
//! - [`QueueStore::increment_counter`] advances a department's token counter by one and returns
//!   the department as stored afterwards;
//! - [`QueueStore::claim_for_service`] moves a patient from `waiting` to `serving` only if they
//!   are still waiting (and, under [`ServingPolicy::Single`], nobody else in the department is
//!   being served);
//! - [`QueueStore::transition`] applies one validated step of the patient state machine
//!   against the status currently stored.
//!
//! Every call is bounded by the store's timeout. A call that returns [`QueueError::Timeout`] has
//! changed nothing; once a store has started writing, the write completes and its real result is
//! returned.
//!
//! Two implementations ship with the crate: [`MemoryStore`] and the YAML-on-disk [`FileStore`].

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::config::ServingPolicy;
use crate::department::{Department, DepartmentChanges};
use crate::patient::{Patient, PatientStatus};
use crate::{QueueError, QueueResult, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of [`QueueStore::claim_for_service`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The patient is now `serving`.
    Claimed(Patient),
    /// The patient was no longer waiting; carries the status found.
    NotWaiting(PatientStatus),
    /// Single-serving policy: this patient is already being served in the department.
    Busy(Patient),
    Missing,
}

/// Result of [`QueueStore::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(Patient),
    /// The stored status does not allow the requested step; carries the status found.
    Rejected(PatientStatus),
    Missing,
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts a new department. Fails with a conflict if the name or prefix is taken.
    async fn insert_department(&self, department: Department) -> QueueResult<()>;

    async fn department(&self, id: &RecordId) -> QueueResult<Option<Department>>;

    async fn department_by_name(&self, name: &str) -> QueueResult<Option<Department>>;

    /// All departments, sorted by name.
    async fn departments(&self) -> QueueResult<Vec<Department>>;

    /// Applies `changes` atomically, preserving the counter.
    ///
    /// Fails with a conflict if the new name or prefix is taken, or if the department is being
    /// renamed while it still has waiting or serving patients.
    async fn update_department(
        &self,
        id: &RecordId,
        changes: &DepartmentChanges,
    ) -> QueueResult<Option<Department>>;

    async fn delete_department(&self, id: &RecordId) -> QueueResult<Option<Department>>;

    /// Adds one to the department's counter in a single atomic step and returns the updated
    /// department, or `None` if it does not exist.
    async fn increment_counter(&self, id: &RecordId) -> QueueResult<Option<Department>>;

    /// Inserts a new patient. Fails with a conflict if the token number is already stored.
    async fn insert_patient(&self, patient: Patient) -> QueueResult<()>;

    async fn patient(&self, id: &RecordId) -> QueueResult<Option<Patient>>;

    async fn patient_by_token(&self, token_number: &str) -> QueueResult<Option<Patient>>;

    /// Patients of `department` in `status`, in no particular order.
    async fn patients(
        &self,
        department: &str,
        status: PatientStatus,
    ) -> QueueResult<Vec<Patient>>;

    async fn claim_for_service(
        &self,
        id: &RecordId,
        policy: ServingPolicy,
        at: DateTime<Utc>,
    ) -> QueueResult<Claim>;

    async fn transition(
        &self,
        id: &RecordId,
        to: PatientStatus,
        at: DateTime<Utc>,
    ) -> QueueResult<Transition>;
}

/// Advances `department.current_token` by one.
pub(crate) fn advance_counter(department: &mut Department) -> QueueResult<()> {
    department.current_token = department.current_token.checked_add(1).ok_or_else(|| {
        QueueError::InvalidInput(format!(
            "token counter of department {} is exhausted",
            department.name
        ))
    })?;
    Ok(())
}

/// Rejects `candidate` if another department already uses its name or prefix.
pub(crate) fn ensure_unique<'a, I>(existing: I, candidate: &Department) -> QueueResult<()>
where
    I: IntoIterator<Item = &'a Department>,
{
    for other in existing {
        if other.id == candidate.id {
            continue;
        }
        if other.name == candidate.name {
            return Err(QueueError::DuplicateDepartment(
                candidate.name.to_string(),
            ));
        }
        if other.prefix == candidate.prefix {
            return Err(QueueError::DuplicatePrefix(candidate.prefix.to_string()));
        }
    }
    Ok(())
}

/// Computes the updated department for [`QueueStore::update_department`].
///
/// `has_active_patients` reports whether patients under the current name are waiting or
/// serving.
pub(crate) fn updated_department<'a, I>(
    current: &Department,
    changes: &DepartmentChanges,
    others: I,
    has_active_patients: bool,
) -> QueueResult<Department>
where
    I: IntoIterator<Item = &'a Department>,
{
    let mut updated = current.clone();
    changes.apply_to(&mut updated);

    if updated.name != current.name && has_active_patients {
        return Err(QueueError::DepartmentHasActivePatients(
            current.name.to_string(),
        ));
    }

    ensure_unique(others, &updated)?;
    Ok(updated)
}

/// Decides a claim on `target`. `serving` is any patient already being served in the same
/// department. Returns `None` when the claim may proceed.
pub(crate) fn refuse_claim(
    target: &Patient,
    serving: Option<&Patient>,
    policy: ServingPolicy,
) -> Option<Claim> {
    if target.status != PatientStatus::Waiting {
        return Some(Claim::NotWaiting(target.status));
    }
    match (policy, serving) {
        (ServingPolicy::Single, Some(current)) => Some(Claim::Busy(current.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::Priority;
    use crate::NonEmptyText;

    fn waiting_patient() -> Patient {
        Patient {
            id: RecordId::new(),
            name: NonEmptyText::new("Dev").unwrap(),
            age: 51,
            department: "Cardiology".into(),
            token_number: "C-1".into(),
            token_sequence: 1,
            priority: Priority::Normal,
            status: PatientStatus::Waiting,
            created_at: Utc::now(),
            called_at: None,
            completed_at: None,
            cancelled_at: None,
            estimated_wait_time: 0,
        }
    }

    #[test]
    fn test_advance_counter_refuses_overflow() {
        let mut dept = Department::new("Cardiology", "C").unwrap();
        advance_counter(&mut dept).unwrap();
        assert_eq!(dept.current_token, 1);

        dept.current_token = u64::MAX;
        assert!(matches!(
            advance_counter(&mut dept),
            Err(QueueError::InvalidInput(_))
        ));
        assert_eq!(dept.current_token, u64::MAX);
    }

    #[test]
    fn test_ensure_unique_detects_name_and_prefix() {
        let cardiology = Department::new("Cardiology", "C").unwrap();
        let dup_name = Department::new("Cardiology", "K").unwrap();
        let dup_prefix = Department::new("Cancer Care", "C").unwrap();
        let fine = Department::new("Orthopedics", "O").unwrap();

        assert!(matches!(
            ensure_unique([&cardiology], &dup_name),
            Err(QueueError::DuplicateDepartment(_))
        ));
        assert!(matches!(
            ensure_unique([&cardiology], &dup_prefix),
            Err(QueueError::DuplicatePrefix(_))
        ));
        assert!(ensure_unique([&cardiology], &fine).is_ok());
        // A department never conflicts with itself.
        assert!(ensure_unique([&cardiology], &cardiology).is_ok());
    }

    #[test]
    fn test_updated_department_refuses_rename_with_active_queue() {
        let dept = Department::new("Cardiology", "C").unwrap();
        let rename = DepartmentChanges::parse(Some("Cardiac"), None, None).unwrap();
        let deactivate = DepartmentChanges::parse(None, None, Some(false)).unwrap();

        assert!(matches!(
            updated_department(&dept, &rename, [], true),
            Err(QueueError::DepartmentHasActivePatients(_))
        ));
        assert_eq!(
            updated_department(&dept, &rename, [], false).unwrap().name,
            "Cardiac"
        );
        assert!(!updated_department(&dept, &deactivate, [], true)
            .unwrap()
            .is_active);
    }

    #[test]
    fn test_refuse_claim() {
        let target = waiting_patient();
        let mut other = waiting_patient();
        other.status = PatientStatus::Serving;

        assert_eq!(refuse_claim(&target, None, ServingPolicy::Single), None);
        assert_eq!(
            refuse_claim(&target, Some(&other), ServingPolicy::Single),
            Some(Claim::Busy(other.clone()))
        );
        assert_eq!(
            refuse_claim(&target, Some(&other), ServingPolicy::Multiple),
            None
        );

        let mut done = waiting_patient();
        done.status = PatientStatus::Completed;
        assert_eq!(
            refuse_claim(&done, None, ServingPolicy::Multiple),
            Some(Claim::NotWaiting(PatientStatus::Completed))
        );
    }
}
