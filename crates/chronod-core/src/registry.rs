//! Process-wide job registry.
//!
//! In-memory id → record map with a uniqueness invariant. The registry
//! exclusively owns [`JobRecord`]s; the worker and dashboard hold them
//! by id. A process-global instance backs the `schedule()` façade;
//! embedders and tests can also construct their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chronod_types::error::RegistryError;

use crate::job::JobRecord;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Arc<JobRecord>>,
    /// Insertion order, for stable snapshots.
    order: Vec<String>,
}

pub struct JobRegistry {
    inner: RwLock<Inner>,
    next_anonymous: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_anonymous: AtomicU64::new(0),
        }
    }

    /// Insert a record. Fails if the id is already present.
    pub fn register(&self, job: Arc<JobRecord>) -> Result<(), RegistryError> {
        let mut inner = self.write();
        if inner.jobs.contains_key(&job.id) {
            return Err(RegistryError::AlreadyRegistered(job.id.clone()));
        }
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<JobRecord>> {
        self.read().jobs.get(id).cloned()
    }

    /// Remove a record. Returns whether an entry was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.write();
        let removed = inner.jobs.remove(id).is_some();
        if removed {
            inner.order.retain(|existing| existing != id);
        }
        removed
    }

    /// Snapshot of all records in registration order.
    pub fn get_all(&self) -> Vec<Arc<JobRecord>> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    /// Drop every record and reset the anonymous-id counter.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.jobs.clear();
        inner.order.clear();
        self.next_anonymous.store(0, Ordering::SeqCst);
    }

    /// Next `anonymous-job-<N>` id, starting at 1.
    pub fn next_anonymous_id(&self) -> String {
        let n = self.next_anonymous.fetch_add(1, Ordering::SeqCst) + 1;
        format!("anonymous-job-{n}")
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("len", &self.len())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<JobRegistry>> = OnceLock::new();

/// The process-wide registry behind the `schedule()` façade.
pub fn global() -> Arc<JobRegistry> {
    GLOBAL.get_or_init(|| Arc::new(JobRegistry::new())).clone()
}
