//! Patient registration, lookup and cancellation.

use crate::config::CoreConfig;
use crate::notify::{publish_best_effort, Notifier, QueueEventKind};
use crate::ordering::{ahead_of, sort_queue};
use crate::patient::{NewPatient, Patient, PatientStatus};
use crate::store::{QueueStore, Transition};
use crate::token::{TokenIssuer, TokenNumber};
use crate::{QueueError, QueueResult, RecordId};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct PatientService {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn Notifier>,
    issuer: TokenIssuer,
    cfg: Arc<CoreConfig>,
}

impl PatientService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn Notifier>,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(Arc::clone(&store)),
            store,
            notifier,
            cfg,
        }
    }

    /// Registers a patient and places them in their department's queue.
    ///
    /// Input is validated before anything is written. Once a token has been issued it is never
    /// handed out again, even if storing the patient then fails.
    ///
    /// # Errors
    ///
    /// - Validation errors for bad input or an inactive department.
    /// - `QueueError::DepartmentNotFound` if the department does not exist.
    /// - `QueueError::Contention` if every issued token was already stored.
    /// - Transient errors from the datastore.
    pub async fn register(&self, input: NewPatient) -> QueueResult<Patient> {
        let valid = input.validate()?;

        let mut department = self
            .store
            .department_by_name(valid.department.as_str())
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(valid.department.to_string()))?;
        if !department.is_active {
            return Err(QueueError::DepartmentInactive(department.name.to_string()));
        }

        let attempts = self.cfg.max_conflict_retries().saturating_add(1);
        for _ in 0..attempts {
            let issued = self.issuer.issue_for(&department).await?;
            department = issued.department;

            let mut patient = Patient {
                id: RecordId::new(),
                name: valid.name.clone(),
                age: valid.age,
                department: department.name.to_string(),
                token_number: issued.token.to_string(),
                token_sequence: issued.token.sequence(),
                priority: valid.priority,
                status: PatientStatus::Waiting,
                created_at: Utc::now(),
                called_at: None,
                completed_at: None,
                cancelled_at: None,
                estimated_wait_time: 0,
            };

            let waiting = self
                .store
                .patients(&patient.department, PatientStatus::Waiting)
                .await?;
            let ahead = u32::try_from(ahead_of(&waiting, &patient)).unwrap_or(u32::MAX);
            patient.estimated_wait_time =
                ahead.saturating_mul(self.cfg.average_consultation_minutes());

            match self.store.insert_patient(patient.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        department = %patient.department,
                        token = %patient.token_number,
                        priority = %patient.priority,
                        "registered patient"
                    );
                    publish_best_effort(
                        self.notifier.as_ref(),
                        QueueEventKind::PatientAdded,
                        &patient,
                    );
                    return Ok(patient);
                }
                Err(QueueError::DuplicateToken(token)) => {
                    tracing::warn!(token = %token, "token already stored, issuing another");
                }
                Err(e) => {
                    tracing::warn!(
                        token = %patient.token_number,
                        error = %e,
                        "registration failed after token issue; token is burned"
                    );
                    return Err(e);
                }
            }
        }

        Err(QueueError::Contention {
            operation: "patient registration",
            attempts,
        })
    }

    pub async fn get(&self, patient_id: &RecordId) -> QueueResult<Patient> {
        self.store
            .patient(patient_id)
            .await?
            .ok_or_else(|| QueueError::PatientNotFound(patient_id.to_string()))
    }

    /// Looks up a patient by token number such as `C-23`. The token must match exactly.
    pub async fn by_token(&self, token_number: &str) -> QueueResult<Patient> {
        let token = token_number.trim();
        token.parse::<TokenNumber>()?;

        let found = self.store.patient_by_token(token).await?;
        found.ok_or_else(|| QueueError::PatientNotFound(token.to_string()))
    }

    /// Withdraws a waiting patient from the queue.
    ///
    /// # Errors
    ///
    /// `QueueError::IllegalTransition` unless the patient is waiting.
    pub async fn cancel(&self, patient_id: &RecordId) -> QueueResult<Patient> {
        let outcome = self
            .store
            .transition(patient_id, PatientStatus::Cancelled, Utc::now())
            .await?;

        match outcome {
            Transition::Applied(patient) => {
                tracing::info!(
                    department = %patient.department,
                    token = %patient.token_number,
                    "cancelled patient"
                );
                publish_best_effort(
                    self.notifier.as_ref(),
                    QueueEventKind::PatientCancelled,
                    &patient,
                );
                Ok(patient)
            }
            Transition::Rejected(from) => Err(QueueError::IllegalTransition {
                from,
                to: PatientStatus::Cancelled,
            }),
            Transition::Missing => Err(QueueError::PatientNotFound(patient_id.to_string())),
        }
    }

    /// Patients of a department in `status`, in service order.
    pub async fn list_by_department(
        &self,
        department: &str,
        status: PatientStatus,
    ) -> QueueResult<Vec<Patient>> {
        let mut patients = self.store.patients(department, status).await?;
        sort_queue(&mut patients);
        Ok(patients)
    }
}
