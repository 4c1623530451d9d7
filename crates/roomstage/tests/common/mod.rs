//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use roomstage::config::{PollingConfig, SubmissionConfig};
use roomstage::engine::EngineError;
use roomstage::{
    FailedJobSet, JobEngine, JobPoller, JobRecord, MemoryStore, NotificationSink, PhotoCache,
    RemoteJobStatus, SubmitRequest, SubmitResponse, WorkflowOrchestrator,
};

pub const BASE: &str = "https://cdn.example.com/storage";

pub const JOB_A: &str = "5f0c2b8e-1d3a-4e6f-8a9b-0c1d2e3f4a5b";
pub const JOB_B: &str = "9a8b7c6d-5e4f-4a3b-9c2d-1e0f9a8b7c6d";
pub const JOB_K: &str = "c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f";

/// One scripted answer of the status endpoint.
#[derive(Clone)]
pub enum Scripted {
    Snapshot(JobRecord),
    NotFound,
    Fail,
}

/// Job engine driven by scripts. Each job id answers from its own queue; the
/// last entry repeats once the queue is down to one.
#[derive(Default)]
pub struct ScriptedEngine {
    statuses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    submit_results: Mutex<VecDeque<Result<String, u16>>>,
    submitted: Mutex<Vec<SubmitRequest>>,
    status_calls: Mutex<HashMap<String, usize>>,
    total_status_calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, job_id: &str, answers: Vec<Scripted>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), answers.into());
    }

    /// Next submission returns this job id.
    pub fn accept_next(&self, job_id: &str) {
        self.submit_results
            .lock()
            .unwrap()
            .push_back(Ok(job_id.to_string()));
    }

    /// Next submission fails with this HTTP status.
    pub fn reject_next(&self, status: u16) {
        self.submit_results.lock().unwrap().push_back(Err(status));
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_status_calls(&self) -> usize {
        self.total_status_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<SubmitRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobEngine for ScriptedEngine {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, EngineError> {
        self.submitted.lock().unwrap().push(request.clone());
        match self.submit_results.lock().unwrap().pop_front() {
            Some(Ok(job_id)) => Ok(SubmitResponse { job_id }),
            Some(Err(status)) => Err(EngineError::Api {
                status,
                body: "rejected".to_string(),
            }),
            None => Err(EngineError::InvalidResponse("no submission scripted".into())),
        }
    }

    async fn get_status(&self, job_id: &str) -> Result<Option<JobRecord>, EngineError> {
        self.total_status_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default() += 1;

        let answer = {
            let mut statuses = self.statuses.lock().unwrap();
            match statuses.get_mut(job_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match answer {
            Some(Scripted::Snapshot(job)) => Ok(Some(job)),
            Some(Scripted::NotFound) | None => Ok(None),
            Some(Scripted::Fail) => Err(EngineError::Api {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

/// Notification sink that records what it was told.
#[derive(Default)]
pub struct RecordingSink {
    pub completions: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn completions(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify_completion(&self, style: &str) {
        self.completions.lock().unwrap().push(style.to_string());
    }

    fn notify_download_complete(&self, kind: &str) {
        self.downloads.lock().unwrap().push(kind.to_string());
    }
}

pub fn snapshot(id: &str, status: RemoteJobStatus, original_path: &str) -> JobRecord {
    JobRecord {
        id: id.to_string(),
        status,
        original_path: original_path.to_string(),
        empty_path: None,
        styled_path: None,
        applied_style: None,
        created_at: "2026-10-01T10:00:00Z".to_string(),
        updated_at: "2026-10-01T10:00:00Z".to_string(),
    }
}

pub fn processing(id: &str) -> Scripted {
    Scripted::Snapshot(snapshot(id, RemoteJobStatus::Processing, "uploads/123.jpg"))
}

pub fn done_with_empty(id: &str, empty_path: &str) -> Scripted {
    let mut job = snapshot(id, RemoteJobStatus::Done, "uploads/123.jpg");
    job.empty_path = Some(empty_path.to_string());
    Scripted::Snapshot(job)
}

pub fn done_with_styled(id: &str, styled_path: &str, style: &str) -> Scripted {
    let mut job = snapshot(id, RemoteJobStatus::Done, "empty/123.jpg");
    job.styled_path = Some(styled_path.to_string());
    job.applied_style = Some(style.to_string());
    Scripted::Snapshot(job)
}

pub fn errored(id: &str) -> Scripted {
    Scripted::Snapshot(snapshot(id, RemoteJobStatus::Error, "uploads/123.jpg"))
}

/// Everything wired together over in-memory fakes.
pub struct Fixture {
    pub engine: Arc<ScriptedEngine>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<PhotoCache>,
    pub poller: JobPoller,
    pub sink: Arc<RecordingSink>,
    pub orchestrator: WorkflowOrchestrator,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(PollingConfig::default())
    }

    pub fn with_settings(settings: PollingConfig) -> Self {
        let engine = ScriptedEngine::new();
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(PhotoCache::new(store.clone(), BASE));
        let poller = JobPoller::new(
            engine.clone(),
            cache.clone(),
            settings,
            FailedJobSet::in_memory(),
        );
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = WorkflowOrchestrator::new(
            engine.clone(),
            cache.clone(),
            poller.clone(),
            sink.clone(),
            &SubmissionConfig::default(),
        );
        Self {
            engine,
            store,
            cache,
            poller,
            sink,
            orchestrator,
        }
    }
}

/// Lets the paused clock run forward by `secs` seconds.
pub async fn advance(secs: u64) {
    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
}
