//! Photo cache with persistent storage.
//!
//! The cache is the single source of truth for locally known photos. It keeps
//! the whole collection in memory (newest first) and mirrors it to the
//! key-value store under [`PHOTOS_KEY`] after every change. Persistence
//! failures are logged; the in-memory collection stays authoritative.

pub mod reconcile;
pub mod record;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::JobRecord;
use crate::store::{load_json, save_json, KeyValueStore, PHOTOS_KEY};

pub use reconcile::{public_url, ReconcileOutcome};
pub use record::{PhotoCounts, PhotoMetadata, PhotoPatch, PhotoRecord, PhotoStatus};

/// Persisted collection of [`PhotoRecord`]s.
pub struct PhotoCache {
    photos: RwLock<Vec<PhotoRecord>>,
    store: Arc<dyn KeyValueStore>,
    public_base_url: String,
}

impl PhotoCache {
    /// Creates a cache over `store`, loading whatever collection it holds.
    ///
    /// An unreadable collection is logged and treated as empty.
    pub fn new(store: Arc<dyn KeyValueStore>, public_base_url: impl Into<String>) -> Self {
        let cache = Self {
            photos: RwLock::new(Vec::new()),
            store,
            public_base_url: public_base_url.into(),
        };
        cache.reload();
        cache
    }

    /// Re-reads the collection from the store, replacing the in-memory copy.
    /// Returns the number of records loaded.
    pub fn reload(&self) -> usize {
        let loaded: Vec<PhotoRecord> = match load_json(self.store.as_ref(), PHOTOS_KEY) {
            Ok(Some(photos)) => photos,
            Ok(None) => Vec::new(),
            Err(e) => {
                log::error!("Failed to load photo cache: {}", e);
                Vec::new()
            }
        };
        let count = loaded.len();
        *self.write() = loaded;
        log::debug!("Photo cache loaded {} records", count);
        count
    }

    /// Public URL of a storage path under this cache's storage base.
    pub fn public_url(&self, path: &str) -> String {
        public_url(&self.public_base_url, path)
    }

    // ─── CRUD ───────────────────────────────────────────────────────────────

    /// All records, newest first.
    pub fn load_all(&self) -> Vec<PhotoRecord> {
        self.read().clone()
    }

    /// Inserts a record at the front, or replaces the record with the same id
    /// in place.
    pub fn save(&self, record: PhotoRecord) -> PhotoRecord {
        let mut photos = self.write();
        match photos.iter_mut().find(|p| p.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => photos.insert(0, record.clone()),
        }
        self.persist(&photos);
        record
    }

    /// Applies a partial update. Returns the updated record, or `None` if no
    /// record has that id. Nothing is written when the patch changes nothing.
    pub fn update(&self, id: &str, patch: PhotoPatch) -> Option<PhotoRecord> {
        let mut photos = self.write();
        let record = photos.iter_mut().find(|p| p.id == id)?;
        let changed = patch.apply(record);
        let updated = record.clone();
        if changed {
            self.persist(&photos);
        }
        Some(updated)
    }

    /// Removes a record. Returns true if it existed.
    pub fn delete(&self, id: &str) -> bool {
        let mut photos = self.write();
        let before = photos.len();
        photos.retain(|p| p.id != id);
        let removed = photos.len() != before;
        if removed {
            self.persist(&photos);
        }
        removed
    }

    /// Marks a record failed. Returns false if no record has that id.
    pub fn mark_failed(&self, id: &str) -> bool {
        self.update(id, PhotoPatch::status(PhotoStatus::Failed))
            .is_some()
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<PhotoRecord> {
        self.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn get_photos_by_status(&self, status: PhotoStatus) -> Vec<PhotoRecord> {
        self.read()
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// The `limit` most recently created records.
    pub fn get_recent_photos(&self, limit: usize) -> Vec<PhotoRecord> {
        let mut photos = self.load_all();
        photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        photos.truncate(limit);
        photos
    }

    pub fn counts(&self) -> PhotoCounts {
        let photos = self.read();
        let mut counts = PhotoCounts {
            total: photos.len(),
            ..Default::default()
        };
        for photo in photos.iter() {
            match photo.status {
                PhotoStatus::Processing => counts.processing += 1,
                PhotoStatus::Completed => counts.completed += 1,
                PhotoStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// The record bound to `job_id` through its metadata.
    pub fn find_by_job_id(&self, job_id: &str) -> Option<PhotoRecord> {
        self.read()
            .iter()
            .find(|p| p.job_id() == Some(job_id))
            .cloned()
    }

    // ─── Reconciliation ─────────────────────────────────────────────────────

    /// Merges a remote job snapshot into the record it belongs to.
    ///
    /// Result URLs and style are only filled when unset; the status is always
    /// recomputed from the remote status. The collection is persisted only if
    /// the record actually changed.
    pub fn reconcile(&self, job: &JobRecord) -> ReconcileOutcome {
        let mut photos = self.write();
        let Some(idx) = reconcile::find_match(&photos, job, &self.public_base_url) else {
            log::debug!("No local photo matches job {}", job.id);
            return ReconcileOutcome::NoMatch;
        };

        if !reconcile::merge(&mut photos[idx], job, &self.public_base_url) {
            return ReconcileOutcome::Unchanged;
        }

        let updated = photos[idx].clone();
        self.persist(&photos);
        log::info!(
            "Reconciled job {} into photo {} (status: {})",
            job.id,
            updated.id,
            updated.status
        );
        ReconcileOutcome::Updated(updated)
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn persist(&self, photos: &[PhotoRecord]) {
        if let Err(e) = save_json(self.store.as_ref(), PHOTOS_KEY, photos) {
            log::error!("Failed to persist photo cache: {}", e);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<PhotoRecord>> {
        match self.photos.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Photo cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<PhotoRecord>> {
        match self.photos.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Photo cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
