//! Queue engine: ordering, calling, completion and wait estimates for one department queue.
//!
//! Nothing is cached. Every call recomputes the queue from the datastore.

use crate::config::CoreConfig;
use crate::notify::{publish_best_effort, Notifier, QueueEventKind};
use crate::ordering::{head_of_queue, service_order, sort_queue};
use crate::patient::{Patient, PatientStatus};
use crate::store::{Claim, QueueStore, Transition};
use crate::{QueueError, QueueResult, RecordId};
use chrono::Utc;
use std::sync::Arc;

/// Snapshot of a department queue's expected wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEstimate {
    /// Patients currently waiting.
    pub waiting: usize,
    /// `waiting` times the configured average consultation length.
    pub minutes: u64,
}

#[derive(Clone)]
pub struct QueueEngine {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn Notifier>,
    cfg: Arc<CoreConfig>,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn Notifier>,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            notifier,
            cfg,
        }
    }

    /// Patients of `department` in `status`, in service order.
    ///
    /// An unknown department simply has an empty queue.
    pub async fn list_queue(
        &self,
        department: &str,
        status: PatientStatus,
    ) -> QueueResult<Vec<Patient>> {
        let mut patients = self.store.patients(department, status).await?;
        sort_queue(&mut patients);
        Ok(patients)
    }

    /// The patient currently being served, earliest-called first if there are several.
    pub async fn current_serving(&self, department: &str) -> QueueResult<Option<Patient>> {
        let serving = self
            .store
            .patients(department, PatientStatus::Serving)
            .await?;
        Ok(serving.into_iter().min_by(|a, b| {
            a.called_at
                .cmp(&b.called_at)
                .then_with(|| service_order(a, b))
        }))
    }

    /// Claims the head of the department queue for service.
    ///
    /// Returns `Ok(None)` without mutating anything when nobody is waiting. A claim lost to a
    /// concurrent caller is retried against a freshly loaded queue.
    ///
    /// # Errors
    ///
    /// - `QueueError::DepartmentBusy` under the single-serving policy while someone is being
    ///   served.
    /// - `QueueError::Contention` if every attempt lost its claim.
    pub async fn call_next(&self, department: &str) -> QueueResult<Option<Patient>> {
        let policy = self.cfg.serving_policy();
        let attempts = self.cfg.max_conflict_retries().saturating_add(1);

        for attempt in 1..=attempts {
            let waiting = self
                .store
                .patients(department, PatientStatus::Waiting)
                .await?;
            let Some(head) = head_of_queue(&waiting) else {
                return Ok(None);
            };

            let claim = self
                .store
                .claim_for_service(&head.id, policy, Utc::now())
                .await?;

            match claim {
                Claim::Claimed(patient) => {
                    tracing::info!(department, token = %patient.token_number, "called patient");
                    publish_best_effort(
                        self.notifier.as_ref(),
                        QueueEventKind::PatientCalled,
                        &patient,
                    );
                    return Ok(Some(patient));
                }
                Claim::Busy(serving) => {
                    return Err(QueueError::DepartmentBusy {
                        department: department.to_string(),
                        token: serving.token_number,
                    });
                }
                Claim::NotWaiting(_) | Claim::Missing => {
                    tracing::debug!(
                        department,
                        token = %head.token_number,
                        attempt,
                        "lost claim on queue head, retrying"
                    );
                }
            }
        }

        Err(QueueError::Contention {
            operation: "call next",
            attempts,
        })
    }

    /// Completes the consultation of a patient who is being served.
    ///
    /// # Errors
    ///
    /// - `QueueError::PatientNotFound` if no such patient exists.
    /// - `QueueError::IllegalTransition` if the patient is not being served.
    pub async fn mark_completed(&self, patient_id: &RecordId) -> QueueResult<Patient> {
        let outcome = self
            .store
            .transition(patient_id, PatientStatus::Completed, Utc::now())
            .await?;

        match outcome {
            Transition::Applied(patient) => {
                tracing::info!(
                    department = %patient.department,
                    token = %patient.token_number,
                    "completed consultation"
                );
                publish_best_effort(
                    self.notifier.as_ref(),
                    QueueEventKind::PatientCompleted,
                    &patient,
                );
                Ok(patient)
            }
            Transition::Rejected(from) => Err(QueueError::IllegalTransition {
                from,
                to: PatientStatus::Completed,
            }),
            Transition::Missing => Err(QueueError::PatientNotFound(patient_id.to_string())),
        }
    }

    pub async fn estimate_wait_time(&self, department: &str) -> QueueResult<WaitEstimate> {
        let waiting = self
            .store
            .patients(department, PatientStatus::Waiting)
            .await?
            .len();

        Ok(WaitEstimate {
            waiting,
            minutes: (waiting as u64)
                .saturating_mul(u64::from(self.cfg.average_consultation_minutes())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BroadcastNotifier;
    use crate::patient::Priority;
    use crate::store::MemoryStore;
    use crate::{NonEmptyText, ServingPolicy};
    use chrono::{DateTime, Duration, TimeZone};
    use std::path::PathBuf;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 11, 8, 30, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn patient(token_sequence: u64, priority: Priority, offset_secs: i64) -> Patient {
        Patient {
            id: RecordId::new(),
            name: NonEmptyText::new(format!("Patient {}", token_sequence)).unwrap(),
            age: 45,
            department: "Cardiology".into(),
            token_number: format!("C-{}", token_sequence),
            token_sequence,
            priority,
            status: PatientStatus::Waiting,
            created_at: at(offset_secs),
            called_at: None,
            completed_at: None,
            cancelled_at: None,
            estimated_wait_time: 0,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<BroadcastNotifier>,
        engine: QueueEngine,
    }

    fn fixture(policy: ServingPolicy) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(BroadcastNotifier::default());
        let cfg = Arc::new(
            CoreConfig::with_defaults(PathBuf::from("unused")).with_serving_policy(policy),
        );
        let engine = QueueEngine::new(store.clone(), notifier.clone(), cfg);
        Fixture {
            store,
            notifier,
            engine,
        }
    }

    #[tokio::test]
    async fn test_list_queue_orders_emergencies_first() {
        let f = fixture(ServingPolicy::Single);
        for p in [
            patient(1, Priority::Normal, 0),
            patient(2, Priority::Emergency, 30),
            patient(3, Priority::Normal, 10),
        ] {
            f.store.insert_patient(p).await.unwrap();
        }

        let queue = f
            .engine
            .list_queue("Cardiology", PatientStatus::Waiting)
            .await
            .unwrap();
        let tokens: Vec<&str> = queue.iter().map(|p| p.token_number.as_str()).collect();
        assert_eq!(tokens, vec!["C-2", "C-1", "C-3"]);

        assert!(f
            .engine
            .list_queue("Dermatology", PatientStatus::Waiting)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_call_next_empty_queue_returns_none() {
        let f = fixture(ServingPolicy::Single);
        assert_eq!(f.engine.call_next("Cardiology").await.unwrap(), None);
        assert_eq!(f.engine.current_serving("Cardiology").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_call_next_publishes_and_blocks_under_single_policy() {
        let f = fixture(ServingPolicy::Single);
        let mut events = f.notifier.subscribe("Cardiology").unwrap();
        f.store
            .insert_patient(patient(1, Priority::Normal, 0))
            .await
            .unwrap();
        f.store
            .insert_patient(patient(2, Priority::Normal, 5))
            .await
            .unwrap();

        let called = f.engine.call_next("Cardiology").await.unwrap().unwrap();
        assert_eq!(called.token_number, "C-1");
        assert_eq!(called.status, PatientStatus::Serving);
        assert!(called.called_at.is_some());

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, QueueEventKind::PatientCalled);
        assert_eq!(event.patient.id, called.id);

        let err = f.engine.call_next("Cardiology").await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::DepartmentBusy { ref token, .. } if token == "C-1"
        ));

        f.engine.mark_completed(&called.id).await.unwrap();
        let next = f.engine.call_next("Cardiology").await.unwrap().unwrap();
        assert_eq!(next.token_number, "C-2");
    }

    #[tokio::test]
    async fn test_call_next_twice_under_multiple_policy() {
        let f = fixture(ServingPolicy::Multiple);
        f.store
            .insert_patient(patient(1, Priority::Normal, 0))
            .await
            .unwrap();
        f.store
            .insert_patient(patient(2, Priority::Normal, 5))
            .await
            .unwrap();

        let first = f.engine.call_next("Cardiology").await.unwrap().unwrap();
        let second = f.engine.call_next("Cardiology").await.unwrap().unwrap();
        assert_ne!(first.id, second.id);

        assert!(f
            .engine
            .list_queue("Cardiology", PatientStatus::Waiting)
            .await
            .unwrap()
            .is_empty());
        let current = f.engine.current_serving("Cardiology").await.unwrap().unwrap();
        assert_eq!(current.id, first.id);
    }

    #[tokio::test]
    async fn test_mark_completed_requires_serving() {
        let f = fixture(ServingPolicy::Single);
        let waiting = patient(1, Priority::Normal, 0);
        let id = waiting.id.clone();
        f.store.insert_patient(waiting).await.unwrap();

        let err = f.engine.mark_completed(&id).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::IllegalTransition {
                from: PatientStatus::Waiting,
                to: PatientStatus::Completed
            }
        ));

        let missing = f.engine.mark_completed(&RecordId::new()).await.unwrap_err();
        assert!(matches!(missing, QueueError::PatientNotFound(_)));

        let stored = f.store.patient(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, PatientStatus::Waiting);
    }

    #[tokio::test]
    async fn test_estimate_wait_time() {
        let f = fixture(ServingPolicy::Single);
        assert_eq!(
            f.engine.estimate_wait_time("Cardiology").await.unwrap(),
            WaitEstimate {
                waiting: 0,
                minutes: 0
            }
        );

        for seq in 1..=3 {
            f.store
                .insert_patient(patient(seq, Priority::Normal, seq as i64))
                .await
                .unwrap();
        }
        let estimate = f.engine.estimate_wait_time("Cardiology").await.unwrap();
        assert_eq!(estimate.waiting, 3);
        assert_eq!(estimate.minutes, 30);
    }
}
