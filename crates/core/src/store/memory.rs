//! In-memory datastore.
//!
//! Every trait method takes the table lock exactly once, which makes each conditional update a
//! single atomic step. Only lock acquisition is subject to the timeout; the work done under the
//! lock is synchronous, so a timed-out call has touched nothing.

use super::{
    advance_counter, ensure_unique, refuse_claim, updated_department, Claim, QueueStore,
    Transition,
};
use crate::config::ServingPolicy;
use crate::constants::DEFAULT_STORE_TIMEOUT_MS;
use crate::department::{Department, DepartmentChanges};
use crate::patient::{Patient, PatientStatus};
use crate::{QueueError, QueueResult, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    departments: HashMap<RecordId, Department>,
    patients: HashMap<RecordId, Patient>,
    tokens: HashMap<String, RecordId>,
}

impl Tables {
    fn serving_in(&self, department: &str, exclude: &RecordId) -> Option<&Patient> {
        self.patients
            .values()
            .filter(|p| {
                p.department == department
                    && p.status == PatientStatus::Serving
                    && &p.id != exclude
            })
            .min_by_key(|p| p.called_at)
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: RwLock::default(),
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a call may wait for the table lock.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn read(&self) -> QueueResult<RwLockReadGuard<'_, Tables>> {
        tokio::time::timeout(self.timeout, self.tables.read())
            .await
            .map_err(|_| QueueError::Timeout(self.timeout))
    }

    async fn write(&self) -> QueueResult<RwLockWriteGuard<'_, Tables>> {
        tokio::time::timeout(self.timeout, self.tables.write())
            .await
            .map_err(|_| QueueError::Timeout(self.timeout))
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert_department(&self, department: Department) -> QueueResult<()> {
        let mut tables = self.write().await?;
        ensure_unique(tables.departments.values(), &department)?;
        tables.departments.insert(department.id.clone(), department);
        Ok(())
    }

    async fn department(&self, id: &RecordId) -> QueueResult<Option<Department>> {
        Ok(self.read().await?.departments.get(id).cloned())
    }

    async fn department_by_name(&self, name: &str) -> QueueResult<Option<Department>> {
        let tables = self.read().await?;
        Ok(tables
            .departments
            .values()
            .find(|d| d.name.as_str() == name)
            .cloned())
    }

    async fn departments(&self) -> QueueResult<Vec<Department>> {
        let tables = self.read().await?;
        let mut all: Vec<Department> = tables.departments.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn update_department(
        &self,
        id: &RecordId,
        changes: &DepartmentChanges,
    ) -> QueueResult<Option<Department>> {
        let mut tables = self.write().await?;
        let Some(current) = tables.departments.get(id) else {
            return Ok(None);
        };

        let has_active_patients = tables
            .patients
            .values()
            .any(|p| p.department == current.name.as_str() && p.status.is_active());
        let updated = updated_department(
            current,
            changes,
            tables.departments.values(),
            has_active_patients,
        )?;

        tables.departments.insert(id.clone(), updated.clone());
        Ok(Some(updated))
    }

    async fn delete_department(&self, id: &RecordId) -> QueueResult<Option<Department>> {
        Ok(self.write().await?.departments.remove(id))
    }

    async fn increment_counter(&self, id: &RecordId) -> QueueResult<Option<Department>> {
        let mut tables = self.write().await?;
        let Some(department) = tables.departments.get_mut(id) else {
            return Ok(None);
        };
        advance_counter(department)?;
        Ok(Some(department.clone()))
    }

    async fn insert_patient(&self, patient: Patient) -> QueueResult<()> {
        let mut tables = self.write().await?;
        if tables.tokens.contains_key(&patient.token_number) {
            return Err(QueueError::DuplicateToken(patient.token_number));
        }
        tables
            .tokens
            .insert(patient.token_number.clone(), patient.id.clone());
        tables.patients.insert(patient.id.clone(), patient);
        Ok(())
    }

    async fn patient(&self, id: &RecordId) -> QueueResult<Option<Patient>> {
        Ok(self.read().await?.patients.get(id).cloned())
    }

    async fn patient_by_token(&self, token_number: &str) -> QueueResult<Option<Patient>> {
        let tables = self.read().await?;
        Ok(tables
            .tokens
            .get(token_number)
            .and_then(|id| tables.patients.get(id))
            .cloned())
    }

    async fn patients(
        &self,
        department: &str,
        status: PatientStatus,
    ) -> QueueResult<Vec<Patient>> {
        let tables = self.read().await?;
        Ok(tables
            .patients
            .values()
            .filter(|p| p.department == department && p.status == status)
            .cloned()
            .collect())
    }

    async fn claim_for_service(
        &self,
        id: &RecordId,
        policy: ServingPolicy,
        at: DateTime<Utc>,
    ) -> QueueResult<Claim> {
        let mut tables = self.write().await?;
        let Some(target) = tables.patients.get(id) else {
            return Ok(Claim::Missing);
        };
        let serving = tables.serving_in(&target.department, id);
        if let Some(refused) = refuse_claim(target, serving, policy) {
            return Ok(refused);
        }

        let Some(patient) = tables.patients.get_mut(id) else {
            return Ok(Claim::Missing);
        };
        patient.apply_transition(PatientStatus::Serving, at)?;
        Ok(Claim::Claimed(patient.clone()))
    }

    async fn transition(
        &self,
        id: &RecordId,
        to: PatientStatus,
        at: DateTime<Utc>,
    ) -> QueueResult<Transition> {
        let mut tables = self.write().await?;
        let Some(patient) = tables.patients.get_mut(id) else {
            return Ok(Transition::Missing);
        };
        if patient.status.check_transition(to).is_err() {
            return Ok(Transition::Rejected(patient.status));
        }
        patient.apply_transition(to, at)?;
        Ok(Transition::Applied(patient.clone()))
    }
}
