pub mod broadcast;
pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod poller;
pub mod sanitize;
pub mod store;
pub mod workflow;

pub use broadcast::{
    LogNotifier, Notification, NotificationBroadcaster, NotificationSink, WorkflowEvent,
};
pub use cache::{PhotoCache, PhotoPatch, PhotoRecord, PhotoStatus, ReconcileOutcome};
pub use config::{load_config, Config};
pub use db::Database;
pub use engine::{HttpEngine, JobEngine, JobRecord, RemoteJobStatus, SubmitRequest, SubmitResponse};
pub use error::{ConfigError, Result, RoomstageError, WorkflowError};
pub use poller::{FailedJobSet, JobPoller, PollHooks, PollStart, StopReason};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use workflow::{SessionEvent, WorkflowOrchestrator, WorkflowRecord, WorkflowStatus, WorkflowType};
