//! YAML-on-disk datastore.
//!
//! Records live in sharded directories beneath the store root:
//!
//! ```text
//! <root>/departments/<s1>/<s2>/<id>/department.yaml
//! <root>/patients/<s1>/<s2>/<id>/patient.yaml
//! ```
//!
//! where `s1` and `s2` are the first two byte pairs of the canonical record id. Writes go to a
//! temporary file that is renamed over the record, so readers never observe a partial file.
//!
//! All filesystem work runs on the blocking pool under one store-wide lock. Conditional updates
//! read, check and write while holding it, which makes them atomic with respect to every other
//! call on the same `FileStore`. Two processes pointed at the same directory are not
//! coordinated.
//!
//! The timeout covers waiting for the blocking pool and the lock. A call still waiting when it
//! elapses gives up with `QueueError::Timeout` before touching disk; a call that got the lock in
//! time runs to completion.

use super::{
    advance_counter, ensure_unique, refuse_claim, updated_department, Claim, QueueStore,
    Transition,
};
use crate::config::ServingPolicy;
use crate::constants::{
    DEFAULT_STORE_TIMEOUT_MS, DEPARTMENTS_DIR_NAME, DEPARTMENT_FILENAME, LOCK_POLL_INTERVAL,
    PATIENTS_DIR_NAME, PATIENT_FILENAME, TEMP_FILE_SUFFIX,
};
use crate::department::{Department, DepartmentChanges};
use crate::patient::{Patient, PatientStatus};
use crate::{QueueError, QueueResult, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
    timeout: Duration,
}

struct FileStoreInner {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::DirCreation` if the record directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> QueueResult<Self> {
        let root = root.into();
        for dir in [DEPARTMENTS_DIR_NAME, PATIENTS_DIR_NAME] {
            fs::create_dir_all(root.join(dir)).map_err(QueueError::DirCreation)?;
        }
        tracing::debug!(root = %root.display(), "opened file store");
        Ok(Self {
            inner: Arc::new(FileStoreInner {
                root,
                lock: Mutex::new(()),
            }),
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        })
    }

    /// Sets how long a call may wait before it starts working on disk.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Runs `f` on the blocking pool while holding the store lock.
    ///
    /// `f` only runs if the lock is acquired before the deadline.
    async fn run<T, F>(&self, f: F) -> QueueResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> QueueResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        tokio::task::spawn_blocking(move || {
            let _guard = lock_before(&inner.lock, deadline, timeout)?;
            f(&inner.root)
        })
        .await?
    }
}

fn lock_before(
    lock: &Mutex<()>,
    deadline: Instant,
    timeout: Duration,
) -> QueueResult<MutexGuard<'_, ()>> {
    loop {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => {
                return Err(QueueError::StoreUnavailable(
                    "file store lock poisoned".into(),
                ))
            }
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(QueueError::Timeout(timeout));
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
        }
    }
}

fn department_path(root: &Path, id: &RecordId) -> PathBuf {
    id.sharded_dir(&root.join(DEPARTMENTS_DIR_NAME))
        .join(DEPARTMENT_FILENAME)
}

fn patient_path(root: &Path, id: &RecordId) -> PathBuf {
    id.sharded_dir(&root.join(PATIENTS_DIR_NAME))
        .join(PATIENT_FILENAME)
}

fn read_record<T: DeserializeOwned>(path: &Path) -> QueueResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(QueueError::FileRead(e)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(QueueError::YamlDeserialization)
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> QueueResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(QueueError::DirCreation)?;
    }
    let yaml = serde_yaml::to_string(record).map_err(QueueError::YamlSerialization)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TEMP_FILE_SUFFIX);
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, yaml).map_err(QueueError::FileWrite)?;
    fs::rename(&tmp, path).map_err(QueueError::FileWrite)
}

/// Loads every record named `filename` under a sharded `parent` directory.
///
/// Unreadable or unparsable records are skipped with a warning so one bad file cannot take the
/// whole listing down.
fn load_all<T: DeserializeOwned>(parent: &Path, filename: &str) -> Vec<T> {
    let mut records = Vec::new();

    let s1_iter = match fs::read_dir(parent) {
        Ok(it) => it,
        Err(_) => return records,
    };
    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }

        let s2_iter = match fs::read_dir(&s1_path) {
            Ok(it) => it,
            Err(_) => continue,
        };
        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }

            let id_iter = match fs::read_dir(&s2_path) {
                Ok(it) => it,
                Err(_) => continue,
            };
            for id_ent in id_iter.flatten() {
                let record_path = id_ent.path().join(filename);
                if !record_path.is_file() {
                    continue;
                }

                match read_record::<T>(&record_path) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            path = %record_path.display(),
                            error = %e,
                            "skipping unreadable record"
                        );
                    }
                }
            }
        }
    }

    records
}

fn all_departments(root: &Path) -> Vec<Department> {
    load_all(&root.join(DEPARTMENTS_DIR_NAME), DEPARTMENT_FILENAME)
}

fn all_patients(root: &Path) -> Vec<Patient> {
    load_all(&root.join(PATIENTS_DIR_NAME), PATIENT_FILENAME)
}

#[async_trait]
impl QueueStore for FileStore {
    async fn insert_department(&self, department: Department) -> QueueResult<()> {
        self.run(move |root| {
            ensure_unique(&all_departments(root), &department)?;
            write_record(&department_path(root, &department.id), &department)
        })
        .await
    }

    async fn department(&self, id: &RecordId) -> QueueResult<Option<Department>> {
        let id = id.clone();
        self.run(move |root| read_record(&department_path(root, &id)))
            .await
    }

    async fn department_by_name(&self, name: &str) -> QueueResult<Option<Department>> {
        let name = name.to_owned();
        self.run(move |root| {
            Ok(all_departments(root)
                .into_iter()
                .find(|d| d.name.as_str() == name))
        })
        .await
    }

    async fn departments(&self) -> QueueResult<Vec<Department>> {
        self.run(|root| {
            let mut all = all_departments(root);
            all.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(all)
        })
        .await
    }

    async fn update_department(
        &self,
        id: &RecordId,
        changes: &DepartmentChanges,
    ) -> QueueResult<Option<Department>> {
        let id = id.clone();
        let changes = changes.clone();
        self.run(move |root| {
            let path = department_path(root, &id);
            let Some(current) = read_record::<Department>(&path)? else {
                return Ok(None);
            };

            let has_active_patients = all_patients(root)
                .iter()
                .any(|p| p.department == current.name.as_str() && p.status.is_active());
            let updated = updated_department(
                &current,
                &changes,
                &all_departments(root),
                has_active_patients,
            )?;

            write_record(&path, &updated)?;
            Ok(Some(updated))
        })
        .await
    }

    async fn delete_department(&self, id: &RecordId) -> QueueResult<Option<Department>> {
        let id = id.clone();
        self.run(move |root| {
            let path = department_path(root, &id);
            let Some(existing) = read_record::<Department>(&path)? else {
                return Ok(None);
            };
            if let Some(dir) = path.parent() {
                fs::remove_dir_all(dir).map_err(QueueError::FileWrite)?;
            }
            Ok(Some(existing))
        })
        .await
    }

    async fn increment_counter(&self, id: &RecordId) -> QueueResult<Option<Department>> {
        let id = id.clone();
        self.run(move |root| {
            let path = department_path(root, &id);
            let Some(mut department) = read_record::<Department>(&path)? else {
                return Ok(None);
            };
            advance_counter(&mut department)?;
            write_record(&path, &department)?;
            Ok(Some(department))
        })
        .await
    }

    async fn insert_patient(&self, patient: Patient) -> QueueResult<()> {
        self.run(move |root| {
            if all_patients(root)
                .iter()
                .any(|p| p.token_number == patient.token_number)
            {
                return Err(QueueError::DuplicateToken(patient.token_number));
            }
            write_record(&patient_path(root, &patient.id), &patient)
        })
        .await
    }

    async fn patient(&self, id: &RecordId) -> QueueResult<Option<Patient>> {
        let id = id.clone();
        self.run(move |root| read_record(&patient_path(root, &id)))
            .await
    }

    async fn patient_by_token(&self, token_number: &str) -> QueueResult<Option<Patient>> {
        let token_number = token_number.to_owned();
        self.run(move |root| {
            Ok(all_patients(root)
                .into_iter()
                .find(|p| p.token_number == token_number))
        })
        .await
    }

    async fn patients(
        &self,
        department: &str,
        status: PatientStatus,
    ) -> QueueResult<Vec<Patient>> {
        let department = department.to_owned();
        self.run(move |root| {
            Ok(all_patients(root)
                .into_iter()
                .filter(|p| p.department == department && p.status == status)
                .collect())
        })
        .await
    }

    async fn claim_for_service(
        &self,
        id: &RecordId,
        policy: ServingPolicy,
        at: DateTime<Utc>,
    ) -> QueueResult<Claim> {
        let id = id.clone();
        self.run(move |root| {
            let path = patient_path(root, &id);
            let Some(mut patient) = read_record::<Patient>(&path)? else {
                return Ok(Claim::Missing);
            };

            let serving = all_patients(root)
                .into_iter()
                .filter(|p| {
                    p.department == patient.department
                        && p.status == PatientStatus::Serving
                        && p.id != id
                })
                .min_by_key(|p| p.called_at);
            if let Some(refused) = refuse_claim(&patient, serving.as_ref(), policy) {
                return Ok(refused);
            }

            patient.apply_transition(PatientStatus::Serving, at)?;
            write_record(&path, &patient)?;
            Ok(Claim::Claimed(patient))
        })
        .await
    }

    async fn transition(
        &self,
        id: &RecordId,
        to: PatientStatus,
        at: DateTime<Utc>,
    ) -> QueueResult<Transition> {
        let id = id.clone();
        self.run(move |root| {
            let path = patient_path(root, &id);
            let Some(mut patient) = read_record::<Patient>(&path)? else {
                return Ok(Transition::Missing);
            };
            if patient.status.check_transition(to).is_err() {
                return Ok(Transition::Rejected(patient.status));
            }
            patient.apply_transition(to, at)?;
            write_record(&path, &patient)?;
            Ok(Transition::Applied(patient))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::Priority;
    use crate::NonEmptyText;
    use tempfile::TempDir;

    fn patient(token: &str, seq: u64) -> Patient {
        Patient {
            id: RecordId::new(),
            name: NonEmptyText::new("Mira Okafor").unwrap(),
            age: 61,
            department: "Cardiology".into(),
            token_number: token.into(),
            token_sequence: seq,
            priority: Priority::Emergency,
            status: PatientStatus::Waiting,
            created_at: Utc::now(),
            called_at: None,
            completed_at: None,
            cancelled_at: None,
            estimated_wait_time: 10,
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let dept = Department::new("Cardiology", "C").unwrap();
        let dept_id = dept.id.clone();
        let p = patient("C-1", 1);
        let patient_id = p.id.clone();

        {
            let store = FileStore::open(temp_dir.path()).unwrap();
            store.insert_department(dept).await.unwrap();
            store.increment_counter(&dept_id).await.unwrap();
            store.insert_patient(p).await.unwrap();
        }

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        let dept = reopened.department(&dept_id).await.unwrap().unwrap();
        assert_eq!(dept.current_token, 1);
        let stored = reopened.patient_by_token("C-1").await.unwrap().unwrap();
        assert_eq!(stored.id, patient_id);
        assert_eq!(stored.priority, Priority::Emergency);
    }

    #[tokio::test]
    async fn test_sharded_layout_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        let p = patient("C-7", 7);
        let canonical = p.id.to_string();
        store.insert_patient(p).await.unwrap();

        let expected = temp_dir
            .path()
            .join(PATIENTS_DIR_NAME)
            .join(&canonical[0..2])
            .join(&canonical[2..4])
            .join(&canonical)
            .join(PATIENT_FILENAME);
        assert!(expected.is_file());

        let mut tmp = expected.as_os_str().to_owned();
        tmp.push(TEMP_FILE_SUFFIX);
        assert!(!PathBuf::from(tmp).exists());
    }

    #[tokio::test]
    async fn test_unparsable_record_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.insert_patient(patient("C-1", 1)).await.unwrap();

        let junk_dir = temp_dir
            .path()
            .join(PATIENTS_DIR_NAME)
            .join("ff")
            .join("ff")
            .join("ffffffffffffffffffffffffffffffff");
        fs::create_dir_all(&junk_dir).unwrap();
        fs::write(junk_dir.join(PATIENT_FILENAME), "not: [valid").unwrap();

        let waiting = store
            .patients("Cardiology", PatientStatus::Waiting)
            .await
            .unwrap();
        assert_eq!(waiting.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.insert_patient(patient("C-1", 1)).await.unwrap();

        let err = store.insert_patient(patient("C-1", 1)).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateToken(_)));
    }

    #[tokio::test]
    async fn test_claim_and_complete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        let first = patient("C-1", 1);
        let second = patient("C-2", 2);
        let (first_id, second_id) = (first.id.clone(), second.id.clone());
        store.insert_patient(first).await.unwrap();
        store.insert_patient(second).await.unwrap();

        let claim = store
            .claim_for_service(&first_id, ServingPolicy::Single, Utc::now())
            .await
            .unwrap();
        assert!(matches!(claim, Claim::Claimed(_)));

        let busy = store
            .claim_for_service(&second_id, ServingPolicy::Single, Utc::now())
            .await
            .unwrap();
        assert!(matches!(busy, Claim::Busy(p) if p.id == first_id));

        let done = store
            .transition(&first_id, PatientStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert!(matches!(done, Transition::Applied(p) if p.completed_at.is_some()));

        let reread = store.patient(&first_id).await.unwrap().unwrap();
        assert_eq!(reread.status, PatientStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_department_removes_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        let dept = Department::new("Radiology", "R").unwrap();
        let id = dept.id.clone();
        store.insert_department(dept).await.unwrap();

        let removed = store.delete_department(&id).await.unwrap();
        assert!(removed.is_some());
        assert!(store.department(&id).await.unwrap().is_none());
        assert!(store.delete_department(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_departments_sorted_and_unique() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store
            .insert_department(Department::new("Orthopedics", "O").unwrap())
            .await
            .unwrap();
        store
            .insert_department(Department::new("Cardiology", "C").unwrap())
            .await
            .unwrap();

        let names: Vec<String> = store
            .departments()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name.to_string())
            .collect();
        assert_eq!(names, vec!["Cardiology", "Orthopedics"]);

        let err = store
            .insert_department(Department::new("Oncology", "O").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicatePrefix(_)));
    }

    #[tokio::test]
    async fn test_call_timed_out_behind_lock_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path())
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let dept = Department::new("Cardiology", "C").unwrap();
        let dept_id = dept.id.clone();
        store.insert_department(dept).await.unwrap();
        let p = patient("C-1", 1);
        let patient_id = p.id.clone();
        store.insert_patient(p).await.unwrap();

        let inner = Arc::clone(&store.inner);
        let holder = std::thread::spawn(move || {
            let _guard = inner.lock.lock().unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });
        // Let the holder take the lock first.
        while store.inner.lock.try_lock().is_ok() {
            std::thread::yield_now();
        }

        let err = store.increment_counter(&dept_id).await.unwrap_err();
        assert!(matches!(err, QueueError::Timeout(_)));
        let err = store
            .transition(&patient_id, PatientStatus::Cancelled, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Timeout(_)));
        holder.join().unwrap();

        let stored = store.department(&dept_id).await.unwrap().unwrap();
        assert_eq!(stored.current_token, 0);
        let stored = store.patient(&patient_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PatientStatus::Waiting);
    }
}
