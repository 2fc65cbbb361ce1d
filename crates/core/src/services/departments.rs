//! Department management.

use crate::department::{Department, DepartmentChanges};
use crate::store::QueueStore;
use crate::{QueueError, QueueResult, RecordId};
use std::sync::Arc;

#[derive(Clone)]
pub struct DepartmentService {
    store: Arc<dyn QueueStore>,
}

impl DepartmentService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// All departments, sorted by name.
    pub async fn list(&self) -> QueueResult<Vec<Department>> {
        self.store.departments().await
    }

    pub async fn get(&self, id: &RecordId) -> QueueResult<Department> {
        self.store
            .department(id)
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(id.to_string()))
    }

    pub async fn by_name(&self, name: &str) -> QueueResult<Department> {
        self.store
            .department_by_name(name)
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(name.to_string()))
    }

    /// Creates an active department whose counter starts at zero.
    ///
    /// # Errors
    ///
    /// Validation errors for a bad name or prefix; a conflict if either is already taken.
    pub async fn create(&self, name: &str, prefix: &str) -> QueueResult<Department> {
        let department = Department::new(name, prefix)?;
        self.store.insert_department(department.clone()).await?;

        tracing::info!(
            id = %department.id,
            name = %department.name,
            prefix = %department.prefix,
            "created department"
        );
        Ok(department)
    }

    /// Applies `changes`. The token counter is never modified.
    ///
    /// # Errors
    ///
    /// - `QueueError::DepartmentNotFound` if no such department exists.
    /// - `QueueError::DepartmentHasActivePatients` when renaming a department with a live queue.
    /// - A conflict if the new name or prefix is taken.
    pub async fn update(
        &self,
        id: &RecordId,
        changes: DepartmentChanges,
    ) -> QueueResult<Department> {
        if changes.is_empty() {
            return self.get(id).await;
        }

        let updated = self
            .store
            .update_department(id, &changes)
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(id.to_string()))?;

        tracing::info!(id = %updated.id, name = %updated.name, "updated department");
        Ok(updated)
    }

    /// Deletes a department. Its patients are left untouched.
    pub async fn delete(&self, id: &RecordId) -> QueueResult<Department> {
        let removed = self
            .store
            .delete_department(id)
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(id.to_string()))?;

        tracing::info!(id = %removed.id, name = %removed.name, "deleted department");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> DepartmentService {
        DepartmentService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_list_get() {
        let svc = service();
        let ortho = svc.create("Orthopedics", "O").await.unwrap();
        svc.create("Cardiology", "C").await.unwrap();

        let names: Vec<String> = svc
            .list()
            .await
            .unwrap()
            .iter()
            .map(|d| d.name.to_string())
            .collect();
        assert_eq!(names, vec!["Cardiology", "Orthopedics"]);

        assert_eq!(svc.get(&ortho.id).await.unwrap(), ortho);
        assert_eq!(svc.by_name("Orthopedics").await.unwrap().id, ortho.id);
        assert!(matches!(
            svc.get(&RecordId::new()).await,
            Err(QueueError::DepartmentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let svc = service();
        svc.create("Cardiology", "C").await.unwrap();

        assert!(matches!(
            svc.create("Cardiology", "K").await,
            Err(QueueError::DuplicateDepartment(_))
        ));
        assert!(matches!(
            svc.create("Cancer Care", "C").await,
            Err(QueueError::DuplicatePrefix(_))
        ));
        assert!(matches!(
            svc.create("Neurology", "N-1").await,
            Err(QueueError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let svc = service();
        let dept = svc.create("Cardiology", "C").await.unwrap();

        let unchanged = svc
            .update(&dept.id, DepartmentChanges::default())
            .await
            .unwrap();
        assert_eq!(unchanged, dept);

        let changes = DepartmentChanges::parse(Some("Cardiac Unit"), None, Some(false)).unwrap();
        let updated = svc.update(&dept.id, changes).await.unwrap();
        assert_eq!(updated.name, "Cardiac Unit");
        assert!(!updated.is_active);
        assert_eq!(updated.current_token, 0);

        let removed = svc.delete(&dept.id).await.unwrap();
        assert_eq!(removed.id, dept.id);
        assert!(matches!(
            svc.delete(&dept.id).await,
            Err(QueueError::DepartmentNotFound(_))
        ));
        assert!(matches!(
            svc.update(
                &dept.id,
                DepartmentChanges::parse(None, Some("X"), None).unwrap()
            )
            .await,
            Err(QueueError::DepartmentNotFound(_))
        ));
    }
}
