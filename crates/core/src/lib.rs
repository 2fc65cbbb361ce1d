//! # HQM Core
//!
//! Core business logic for the hospital queue manager.
//!
//! This crate holds the queue domain and its storage:
//! - Departments and their token counters
//! - Patient registration, the patient state machine and queue ordering
//! - Datastores (in-memory and sharded YAML files) behind the [`QueueStore`] trait
//! - Best-effort change notifications behind the [`Notifier`] trait
//!
//! **No API concerns**: authentication and HTTP servers belong in `api-rest` and `api-shared`.

pub mod config;
pub mod constants;
pub mod department;
pub mod error;
pub mod notify;
pub mod ordering;
pub mod patient;
pub mod queue;
pub mod services;
pub mod store;
pub mod token;

pub use config::{CoreConfig, ServingPolicy, StoreKind};
pub use department::{Department, DepartmentChanges};
pub use error::{ErrorKind, QueueError, QueueResult};
pub use notify::{
    BroadcastNotifier, LogNotifier, NoopNotifier, Notifier, NotifyError, QueueEvent,
    QueueEventKind,
};
pub use patient::{NewPatient, Patient, PatientStatus, Priority};
pub use queue::{QueueEngine, WaitEstimate};
pub use services::{open_store, DepartmentService, PatientService, QueueServices};
pub use store::{FileStore, MemoryStore, QueueStore};
pub use token::{IssuedToken, TokenIssuer, TokenNumber};

pub use hqm_types::{NonEmptyText, TextError};
pub use hqm_uuid::RecordId;
