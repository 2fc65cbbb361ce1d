//! Queue change notifications.
//!
//! Services publish a [`QueueEvent`] after every successful queue mutation, on a topic named
//! after the department. Delivery is best-effort: a failed publish is logged by the caller and
//! never undoes the mutation.

use crate::patient::Patient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Default per-topic buffer of the [`BroadcastNotifier`].
pub const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueEventKind {
    PatientAdded,
    PatientCalled,
    PatientCompleted,
    PatientCancelled,
}

impl QueueEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventKind::PatientAdded => "patientAdded",
            QueueEventKind::PatientCalled => "patientCalled",
            QueueEventKind::PatientCompleted => "patientCompleted",
            QueueEventKind::PatientCancelled => "patientCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub kind: QueueEventKind,
    pub department: String,
    pub patient: Patient,
    pub at: DateTime<Utc>,
}

impl QueueEvent {
    pub fn new(kind: QueueEventKind, patient: &Patient) -> Self {
        Self {
            kind,
            department: patient.department.clone(),
            patient: patient.clone(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

pub trait Notifier: Send + Sync {
    fn publish(&self, topic: &str, event: &QueueEvent) -> Result<(), NotifyError>;
}

/// Publishes `kind` for `patient` on the patient's department topic. Failures are logged and
/// swallowed.
pub(crate) fn publish_best_effort(
    notifier: &dyn Notifier,
    kind: QueueEventKind,
    patient: &Patient,
) {
    let event = QueueEvent::new(kind, patient);
    if let Err(e) = notifier.publish(&patient.department, &event) {
        tracing::warn!(
            event = kind.as_str(),
            token = %patient.token_number,
            error = %e,
            "failed to publish queue event"
        );
    }
}

/// In-process fan-out over one `tokio::sync::broadcast` channel per topic.
///
/// Subscribers that fall behind by more than the buffer lose the oldest events.
pub struct BroadcastNotifier {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<QueueEvent>>>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to events published on `topic` from now on.
    pub fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<QueueEvent>, NotifyError> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| NotifyError::Unavailable("topic registry lock poisoned".into()))?;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, topic: &str, event: &QueueEvent) -> Result<(), NotifyError> {
        let topics = self
            .topics
            .lock()
            .map_err(|_| NotifyError::Unavailable("topic registry lock poisoned".into()))?;
        if let Some(sender) = topics.get(topic) {
            // An error here only means nobody is listening right now.
            let _ = sender.send(event.clone());
        }
        Ok(())
    }
}

/// Writes every event to the log and delivers it nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, topic: &str, event: &QueueEvent) -> Result<(), NotifyError> {
        tracing::info!(
            topic,
            event = event.kind.as_str(),
            token = %event.patient.token_number,
            "queue event"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _topic: &str, _event: &QueueEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{PatientStatus, Priority};
    use crate::{NonEmptyText, RecordId};

    fn patient(department: &str) -> Patient {
        Patient {
            id: RecordId::new(),
            name: NonEmptyText::new("Lena").unwrap(),
            age: 28,
            department: department.into(),
            token_number: "C-3".into(),
            token_sequence: 3,
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
    fn test_event_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&QueueEventKind::PatientCalled).unwrap(),
            "\"patientCalled\""
        );
        for kind in [
            QueueEventKind::PatientAdded,
            QueueEventKind::PatientCalled,
            QueueEventKind::PatientCompleted,
            QueueEventKind::PatientCancelled,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_per_topic() {
        let notifier = BroadcastNotifier::default();
        let mut cardiology = notifier.subscribe("Cardiology").unwrap();
        let mut orthopedics = notifier.subscribe("Orthopedics").unwrap();

        let event = QueueEvent::new(QueueEventKind::PatientAdded, &patient("Cardiology"));
        notifier.publish("Cardiology", &event).unwrap();

        assert_eq!(cardiology.recv().await.unwrap(), event);
        assert!(matches!(
            orthopedics.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(4);
        let event = QueueEvent::new(QueueEventKind::PatientCancelled, &patient("Radiology"));
        assert!(notifier.publish("Radiology", &event).is_ok());
        assert!(LogNotifier.publish("Radiology", &event).is_ok());
        assert!(NoopNotifier.publish("Radiology", &event).is_ok());
    }
}
