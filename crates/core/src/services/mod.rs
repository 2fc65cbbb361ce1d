//! Service layer shared by the REST server and the CLI.

mod departments;
mod patients;

pub use departments::DepartmentService;
pub use patients::PatientService;

use crate::config::{CoreConfig, StoreKind};
use crate::notify::Notifier;
use crate::queue::QueueEngine;
use crate::store::{FileStore, MemoryStore, QueueStore};
use crate::QueueResult;
use std::sync::Arc;

/// Opens the datastore selected by `kind`, bounding its calls by `cfg.store_timeout()`.
///
/// The file store is rooted at `cfg.data_dir()`.
pub fn open_store(kind: StoreKind, cfg: &CoreConfig) -> QueueResult<Arc<dyn QueueStore>> {
    let timeout = cfg.store_timeout();
    Ok(match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new().with_timeout(timeout)),
        StoreKind::File => Arc::new(FileStore::open(cfg.data_dir())?.with_timeout(timeout)),
    })
}

/// Every service wired to one datastore and one notifier.
#[derive(Clone)]
pub struct QueueServices {
    pub departments: DepartmentService,
    pub patients: PatientService,
    pub queue: QueueEngine,
}

impl QueueServices {
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn Notifier>,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            departments: DepartmentService::new(Arc::clone(&store)),
            patients: PatientService::new(
                Arc::clone(&store),
                Arc::clone(&notifier),
                Arc::clone(&cfg),
            ),
            queue: QueueEngine::new(store, notifier, cfg),
        }
    }
}
