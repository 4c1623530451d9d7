//! Set of job ids that are never polled again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::{load_json, save_json, KeyValueStore, FAILED_JOBS_KEY};

/// Permanently-failed job ids, optionally mirrored to a key-value store so
/// the set survives restarts.
pub struct FailedJobSet {
    ids: Mutex<HashSet<String>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl FailedJobSet {
    /// A set that lives for the process lifetime only.
    pub fn in_memory() -> Self {
        Self {
            ids: Mutex::new(HashSet::new()),
            store: None,
        }
    }

    /// A set persisted under [`FAILED_JOBS_KEY`], seeded from whatever the
    /// store already holds.
    pub fn persisted(store: Arc<dyn KeyValueStore>) -> Self {
        let ids: HashSet<String> = match load_json::<Vec<String>>(store.as_ref(), FAILED_JOBS_KEY) {
            Ok(Some(ids)) => ids.into_iter().collect(),
            Ok(None) => HashSet::new(),
            Err(e) => {
                log::error!("Failed to load permanently-failed jobs: {}", e);
                HashSet::new()
            }
        };
        if !ids.is_empty() {
            log::info!("Loaded {} permanently-failed job ids", ids.len());
        }
        Self {
            ids: Mutex::new(ids),
            store: Some(store),
        }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains(job_id)
    }

    /// Adds a job id. Returns false if it was already present.
    pub fn insert(&self, job_id: &str) -> bool {
        let mut ids = self.lock();
        let inserted = ids.insert(job_id.to_string());
        if inserted {
            self.persist(&ids);
        }
        inserted
    }

    pub fn clear(&self) {
        let mut ids = self.lock();
        if ids.is_empty() {
            return;
        }
        ids.clear();
        self.persist(&ids);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn persist(&self, ids: &HashSet<String>) {
        let Some(store) = &self.store else {
            return;
        };
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        if let Err(e) = save_json(store.as_ref(), FAILED_JOBS_KEY, &sorted) {
            log::error!("Failed to persist permanently-failed jobs: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.ids.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Failed job set lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
