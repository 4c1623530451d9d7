//! Wires the library services together from a loaded config.

use std::sync::Arc;

use roomstage::config::Config;
use roomstage::error::ConfigError;
use roomstage::store::KeyValueStore;
use roomstage::{
    Database, FailedJobSet, HttpEngine, JobEngine, JobPoller, NotificationBroadcaster,
    PhotoCache, SqliteStore, WorkflowOrchestrator,
};

pub struct Services {
    pub cache: Arc<PhotoCache>,
    pub poller: JobPoller,
    pub orchestrator: WorkflowOrchestrator,
    pub notifications: NotificationBroadcaster,
}

impl Services {
    pub fn build(config: &Config) -> roomstage::Result<Self> {
        let db_path = config
            .storage
            .resolved_database_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "Could not determine database path; set storage.database_path"
                    .to_string(),
            })?;
        let db = Database::open(&db_path)?;
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(db));

        let cache = Arc::new(PhotoCache::new(
            store.clone(),
            config.storage.public_base_url.as_str(),
        ));

        let failed = if config.polling.persist_failed_jobs {
            FailedJobSet::persisted(store)
        } else {
            FailedJobSet::in_memory()
        };

        let engine: Arc<dyn JobEngine> = Arc::new(HttpEngine::new(&config.engine)?);
        let poller = JobPoller::new(
            engine.clone(),
            cache.clone(),
            config.polling.clone(),
            failed,
        );

        let notifications = NotificationBroadcaster::default();
        let orchestrator = WorkflowOrchestrator::new(
            engine,
            cache.clone(),
            poller.clone(),
            Arc::new(notifications.clone()),
            &config.submission,
        );

        log::debug!(
            "Services ready (engine: {}, database: {})",
            config.engine.base_url,
            db_path.display()
        );

        Ok(Self {
            cache,
            poller,
            orchestrator,
            notifications,
        })
    }
}
