//! Persistent key-value storage used by the photo cache and the poller.
//!
//! Each consumer keeps one serialized collection under one key, so the
//! store only needs whole-value reads and writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{kv_repo, Database, DatabaseError};

/// Key under which the photo collection is stored.
pub const PHOTOS_KEY: &str = "photos";

/// Key under which the permanently-failed job ids are stored (when enabled).
pub const FAILED_JOBS_KEY: &str = "failed_jobs";

/// Whole-value key-value persistence.
pub trait KeyValueStore: Send + Sync {
    /// Returns the raw value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Replaces the value stored under `key`.
    fn save(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    /// Deletes `key` if present.
    fn remove(&self, key: &str) -> Result<(), DatabaseError>;
}

/// Loads and decodes a JSON value stored under `key`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, DatabaseError> {
    match store.load(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| DatabaseError::Serde {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), DatabaseError> {
    let raw = serde_json::to_string(value).map_err(|source| DatabaseError::Serde {
        key: key.to_string(),
        source,
    })?;
    store.save(key, &raw)
}

/// SQLite-backed store on top of the `kv_store` table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        kv_repo::get(&self.db, key)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        kv_repo::put(&self.db, key, value)
    }

    fn remove(&self, key: &str) -> Result<(), DatabaseError> {
        kv_repo::remove(&self.db, key).map(|_| ())
    }
}

/// In-memory store. Counts writes and can be switched into a failing mode,
/// which makes it handy for exercising persistence paths in tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// When set, every `save` returns an error without storing anything.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.values.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.values().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Io {
                path: key.into(),
                source: std::io::Error::other("memory store configured to fail writes"),
            });
        }
        self.values().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DatabaseError> {
        self.values().remove(key);
        Ok(())
    }
}
