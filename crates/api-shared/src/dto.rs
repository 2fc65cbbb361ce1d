//! Request and response bodies shared by HQM APIs.
//!
//! Field names are camelCase on the wire. Timestamps are RFC 3339 strings.

use hqm_core::{Department, ErrorKind, Patient, QueueError, QueueEvent, WaitEstimate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRes {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub current_token: u64,
    pub is_active: bool,
    pub created_at: String,
}

impl From<&Department> for DepartmentRes {
    fn from(d: &Department) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.to_string(),
            prefix: d.prefix.to_string(),
            current_token: d.current_token,
            is_active: d.is_active,
            created_at: d.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDepartmentReq {
    pub name: String,
    pub prefix: String,
}

/// Partial department update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDepartmentReq {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterPatientReq {
    pub name: String,
    pub age: i64,
    pub department: String,
    /// `normal` (default) or `emergency`.
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientRes {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub department: String,
    pub token_number: String,
    pub priority: String,
    pub status: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
    /// Advisory wait in minutes, computed at registration.
    pub estimated_wait_time: u32,
}

impl From<&Patient> for PatientRes {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.to_string(),
            age: p.age,
            department: p.department.clone(),
            token_number: p.token_number.clone(),
            priority: p.priority.to_string(),
            status: p.status.to_string(),
            created_at: p.created_at.to_rfc3339(),
            called_at: p.called_at.map(|t| t.to_rfc3339()),
            completed_at: p.completed_at.map(|t| t.to_rfc3339()),
            cancelled_at: p.cancelled_at.map(|t| t.to_rfc3339()),
            estimated_wait_time: p.estimated_wait_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitTimeRes {
    pub department: String,
    pub waiting_patients: usize,
    /// Minutes.
    pub estimated_wait_time: u64,
}

impl WaitTimeRes {
    pub fn new(department: &str, estimate: WaitEstimate) -> Self {
        Self {
            department: department.to_string(),
            waiting_patients: estimate.waiting,
            estimated_wait_time: estimate.minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueEventRes {
    /// `patientAdded`, `patientCalled`, `patientCompleted` or `patientCancelled`.
    pub event: String,
    pub department: String,
    pub patient: PatientRes,
    pub at: String,
}

impl From<&QueueEvent> for QueueEventRes {
    fn from(e: &QueueEvent) -> Self {
        Self {
            event: e.kind.as_str().to_string(),
            department: e.department.clone(),
            patient: PatientRes::from(&e.patient),
            at: e.at.to_rfc3339(),
        }
    }
}

/// Optional `?status=` filter; defaults to `waiting`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    /// `not_found`, `conflict`, `validation`, `transient`, `internal` or `unauthorized`.
    pub kind: String,
}

impl From<&QueueError> for ErrorRes {
    fn from(e: &QueueError) -> Self {
        let error = match e.kind() {
            // Internal details stay in the log.
            ErrorKind::Internal => "internal error".to_string(),
            _ => e.to_string(),
        };
        Self {
            error,
            kind: e.kind().as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hqm_core::{NonEmptyText, PatientStatus, Priority, RecordId};

    #[test]
    fn test_patient_res_is_camel_case() {
        let now = chrono::Utc::now();
        let patient = Patient {
            id: RecordId::new(),
            name: NonEmptyText::new("Ivy").unwrap(),
            age: 9,
            department: "Paediatrics".into(),
            token_number: "P-4".into(),
            token_sequence: 4,
            priority: Priority::Emergency,
            status: PatientStatus::Waiting,
            created_at: now,
            called_at: None,
            completed_at: None,
            cancelled_at: None,
            estimated_wait_time: 0,
        };

        let json = serde_json::to_value(PatientRes::from(&patient)).unwrap();
        assert_eq!(json["tokenNumber"], "P-4");
        assert_eq!(json["priority"], "emergency");
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["estimatedWaitTime"], 0);
        assert!(json.get("calledAt").is_none());
    }

    #[test]
    fn test_error_res_hides_internal_detail() {
        let res = ErrorRes::from(&QueueError::PatientNotFound("abc".into()));
        assert_eq!(res.kind, "not_found");
        assert!(res.error.contains("abc"));

        let yaml_err = serde_yaml::from_str::<u32>("not a number").unwrap_err();
        let res = ErrorRes::from(&QueueError::YamlDeserialization(yaml_err));
        assert_eq!(res.kind, "internal");
        assert_eq!(res.error, "internal error");
    }
}
