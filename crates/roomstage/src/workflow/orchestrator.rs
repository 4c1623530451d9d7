//! Workflow orchestration.
//!
//! A workflow binds one user request to one photo record and at most one
//! remote job. The orchestrator submits the job, registers polling for it and
//! turns the poller's snapshots and stop reasons into workflow transitions,
//! photo cache updates and notifications.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::broadcast::{NotificationSink, WorkflowEvent, WorkflowEventBroadcaster};
use crate::cache::{PhotoCache, PhotoPatch, PhotoRecord, PhotoStatus};
use crate::config::SubmissionConfig;
use crate::engine::{JobEngine, JobRecord, RemoteJobStatus, SubmitRequest};
use crate::error::WorkflowError;
use crate::poller::{is_valid_job_id, JobPoller, PollHooks, PollStart, StopReason};
use crate::sanitize::redact_uri;

use super::record::{WorkflowRecord, WorkflowStatus, WorkflowType};

/// Session-change signals from the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
}

struct OrchestratorInner {
    engine: Arc<dyn JobEngine>,
    cache: Arc<PhotoCache>,
    poller: JobPoller,
    notifier: Arc<dyn NotificationSink>,
    events: WorkflowEventBroadcaster,
    quality: String,
    workflows: RwLock<HashMap<String, WorkflowRecord>>,
}

/// Drives workflows from submission to completion. Cloning is cheap and
/// clones share all state.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl WorkflowOrchestrator {
    pub fn new(
        engine: Arc<dyn JobEngine>,
        cache: Arc<PhotoCache>,
        poller: JobPoller,
        notifier: Arc<dyn NotificationSink>,
        submission: &SubmissionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                engine,
                cache,
                poller,
                notifier,
                events: WorkflowEventBroadcaster::default(),
                quality: submission.quality.clone(),
                workflows: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Receives an event for every workflow state change.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.inner.events.subscribe()
    }

    pub fn poller(&self) -> &JobPoller {
        &self.inner.poller
    }

    pub fn cache(&self) -> &Arc<PhotoCache> {
        &self.inner.cache
    }

    // ─── Starting workflows ─────────────────────────────────────────────────

    /// Creates a processing photo for `image_uri`, submits it for room
    /// emptying and starts polling the job. Returns the workflow id.
    ///
    /// On submission failure the photo is kept, marked failed, and the
    /// workflow ends in `error`.
    pub async fn start_room_creation(
        &self,
        image_uri: &str,
        room_type: Option<&str>,
    ) -> Result<String, WorkflowError> {
        let photo = self
            .inner
            .cache
            .save(PhotoRecord::new(image_uri, room_type.map(str::to_string)));

        let mut workflow = WorkflowRecord::new(WorkflowType::RoomCreation, &photo.id);
        workflow.room_type = room_type.map(str::to_string);
        let workflow_id = workflow.id.clone();
        self.insert(workflow);

        log::info!(
            "Starting room creation workflow {} for photo {}",
            workflow_id,
            photo.id
        );

        let request = SubmitRequest {
            image_uri: image_uri.to_string(),
            room_type: room_type.map(str::to_string),
            style: None,
            quality: self.inner.quality.clone(),
        };
        self.submit(&workflow_id, &photo.id, request).await
    }

    /// Submits `empty_image_uri` for styling on behalf of an existing photo
    /// and starts polling the job. Returns the workflow id.
    pub async fn start_style_application(
        &self,
        empty_image_uri: &str,
        style: &str,
        photo_id: &str,
    ) -> Result<String, WorkflowError> {
        let Some(photo) = self.inner.cache.get(photo_id) else {
            return Err(WorkflowError::PhotoNotFound(photo_id.to_string()));
        };

        self.inner
            .cache
            .update(&photo.id, PhotoPatch::status(PhotoStatus::Processing));

        let mut workflow = WorkflowRecord::new(WorkflowType::StyleApplication, &photo.id);
        workflow.target_style = Some(style.to_string());
        workflow.room_type = photo.room_type.clone();
        let workflow_id = workflow.id.clone();
        self.insert(workflow);

        log::info!(
            "Starting style workflow {} ({}) for photo {}",
            workflow_id,
            style,
            photo.id
        );

        let request = SubmitRequest {
            image_uri: empty_image_uri.to_string(),
            room_type: photo.room_type.clone(),
            style: Some(style.to_string()),
            quality: self.inner.quality.clone(),
        };
        self.submit(&workflow_id, &photo.id, request).await
    }

    /// Same as [`start_style_application`](Self::start_style_application).
    pub async fn start_upstyling(
        &self,
        empty_image_uri: &str,
        style: &str,
        photo_id: &str,
    ) -> Result<String, WorkflowError> {
        self.start_style_application(empty_image_uri, style, photo_id)
            .await
    }

    async fn submit(
        &self,
        workflow_id: &str,
        photo_id: &str,
        request: SubmitRequest,
    ) -> Result<String, WorkflowError> {
        let span = tracing::info_span!(
            "workflow.submit",
            workflow_id = %workflow_id,
            image = %redact_uri(&request.image_uri),
        );
        let submitted = self.inner.engine.submit(&request).instrument(span).await;

        match submitted {
            Ok(response) => {
                let job_id = response.job_id;
                self.inner.cache.update(
                    photo_id,
                    PhotoPatch::default().with_job(&job_id, workflow_id),
                );
                self.modify(workflow_id, |wf| {
                    wf.job_id = Some(job_id.clone());
                    wf.transition(WorkflowStatus::Processing);
                });
                log::info!("Workflow {} submitted as job {}", workflow_id, job_id);
                self.register_polling(workflow_id, &job_id);
                Ok(workflow_id.to_string())
            }
            Err(e) => {
                log::error!("Submission failed for workflow {}: {}", workflow_id, e);
                self.inner.cache.mark_failed(photo_id);
                self.modify(workflow_id, |wf| {
                    wf.error = Some(e.to_string());
                    wf.transition(WorkflowStatus::Error);
                });
                Err(WorkflowError::Submission {
                    workflow_id: workflow_id.to_string(),
                    source: e,
                })
            }
        }
    }

    fn register_polling(&self, workflow_id: &str, job_id: &str) {
        let on_update = {
            let weak = Arc::downgrade(&self.inner);
            let workflow_id = workflow_id.to_string();
            move |job: &JobRecord| {
                if let Some(this) = upgrade(&weak) {
                    this.handle_snapshot(&workflow_id, job);
                }
            }
        };
        let on_stopped = {
            let weak = Arc::downgrade(&self.inner);
            let workflow_id = workflow_id.to_string();
            move |job_id: &str, reason: StopReason| {
                if let Some(this) = upgrade(&weak) {
                    this.handle_stop(&workflow_id, job_id, reason);
                }
            }
        };

        let hooks = PollHooks::default()
            .on_update(on_update)
            .on_stopped(on_stopped);

        match self.inner.poller.start_polling_with(job_id, hooks) {
            PollStart::Started | PollStart::Restarted => {}
            PollStart::InvalidJobId => {
                log::warn!(
                    "Engine returned malformed job id '{}' for workflow {}, not polling",
                    job_id,
                    workflow_id
                );
            }
            PollStart::PermanentlyFailed => {
                self.mark_workflow_failed(workflow_id, Some("job is permanently failed"));
            }
        }
    }

    // ─── Poll results ───────────────────────────────────────────────────────

    fn handle_snapshot(&self, workflow_id: &str, job: &JobRecord) {
        let Some(workflow) = self.get_workflow(workflow_id) else {
            log::debug!("Snapshot for unknown workflow {}, ignoring", workflow_id);
            return;
        };
        if workflow.is_terminal() {
            return;
        }

        match (job.status, workflow.workflow_type) {
            (RemoteJobStatus::Processing, _) => {}
            (RemoteJobStatus::Error, _) => {
                self.mark_workflow_failed(workflow_id, Some("job reported an error"));
            }
            (RemoteJobStatus::Done, WorkflowType::RoomCreation) => {
                if let Some(path) = job.empty_path.as_deref() {
                    let url = self.inner.cache.public_url(path);
                    self.complete_room_emptying(workflow_id, &url);
                }
                self.modify(workflow_id, |wf| wf.transition(WorkflowStatus::Completed));
                log::info!("Room creation workflow {} completed", workflow_id);
            }
            (RemoteJobStatus::Done, WorkflowType::StyleApplication) => {
                match job.styled_path.as_deref() {
                    Some(path) => {
                        let url = self.inner.cache.public_url(path);
                        self.complete_upstyling(workflow_id, &url);
                    }
                    None => {
                        log::warn!(
                            "Job {} finished without a styled result (workflow {})",
                            job.id,
                            workflow_id
                        );
                        self.mark_workflow_failed(workflow_id, Some("no styled result"));
                    }
                }
            }
        }
    }

    fn handle_stop(&self, workflow_id: &str, job_id: &str, reason: StopReason) {
        match reason {
            StopReason::FailureThreshold => {
                self.mark_workflow_failed(workflow_id, Some("job status could not be fetched"));
            }
            StopReason::SessionTimeout => {
                log::info!(
                    "Stopped watching job {} for workflow {}; it stays in processing",
                    job_id,
                    workflow_id
                );
            }
            StopReason::Completed | StopReason::JobErrored | StopReason::Cancelled => {}
        }
    }

    // ─── Completion ─────────────────────────────────────────────────────────

    /// Records the emptied-room result on the workflow's photo and moves the
    /// workflow to `emptying`.
    pub fn complete_room_emptying(&self, workflow_id: &str, result_uri: &str) {
        let Some(workflow) = self.get_workflow(workflow_id) else {
            log::warn!("complete_room_emptying: unknown workflow {}", workflow_id);
            return;
        };
        if workflow.is_terminal() {
            log::warn!(
                "complete_room_emptying: workflow {} is already {}, ignoring",
                workflow_id,
                workflow.status
            );
            return;
        }
        if self.inner.cache.get(&workflow.photo_id).is_none() {
            log::warn!(
                "complete_room_emptying: photo {} of workflow {} not found",
                workflow.photo_id,
                workflow_id
            );
            return;
        }

        self.inner.cache.update(
            &workflow.photo_id,
            PhotoPatch::default().with_empty_url(result_uri),
        );
        self.modify(workflow_id, |wf| wf.transition(WorkflowStatus::Emptying));
    }

    /// Records the styled result and style on the workflow's photo, completes
    /// the workflow and raises a completion notification.
    pub fn complete_upstyling(&self, workflow_id: &str, result_uri: &str) {
        let Some(workflow) = self.get_workflow(workflow_id) else {
            log::warn!("complete_upstyling: unknown workflow {}", workflow_id);
            return;
        };
        if workflow.is_terminal() {
            log::warn!(
                "complete_upstyling: workflow {} is already {}, ignoring",
                workflow_id,
                workflow.status
            );
            return;
        }
        let Some(style) = workflow.target_style.clone() else {
            log::warn!(
                "complete_upstyling: workflow {} has no target style",
                workflow_id
            );
            return;
        };
        if self.inner.cache.get(&workflow.photo_id).is_none() {
            log::warn!(
                "complete_upstyling: photo {} of workflow {} not found",
                workflow.photo_id,
                workflow_id
            );
            return;
        }

        self.inner.cache.update(
            &workflow.photo_id,
            PhotoPatch::status(PhotoStatus::Completed)
                .with_styled_url(result_uri)
                .with_style(&style),
        );
        self.modify(workflow_id, |wf| wf.transition(WorkflowStatus::Completed));
        self.inner.notifier.notify_completion(&style);
        log::info!("Style workflow {} completed ({})", workflow_id, style);
    }

    /// Moves the workflow to `failed` and marks its photo failed. Terminal
    /// workflows are left as they are.
    pub fn mark_workflow_failed(&self, workflow_id: &str, reason: Option<&str>) {
        let Some(workflow) = self.get_workflow(workflow_id) else {
            log::warn!("mark_workflow_failed: unknown workflow {}", workflow_id);
            return;
        };
        if workflow.is_terminal() {
            log::warn!(
                "mark_workflow_failed: workflow {} is already {}, ignoring",
                workflow_id,
                workflow.status
            );
            return;
        }

        if !self.inner.cache.mark_failed(&workflow.photo_id) {
            log::warn!(
                "mark_workflow_failed: photo {} of workflow {} not found",
                workflow.photo_id,
                workflow_id
            );
        }
        self.modify(workflow_id, |wf| {
            if let Some(reason) = reason {
                wf.error = Some(reason.to_string());
            }
            wf.transition(WorkflowStatus::Failed);
        });
        log::warn!(
            "Workflow {} failed: {}",
            workflow_id,
            reason.unwrap_or("no reason given")
        );
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowRecord> {
        self.read().get(workflow_id).cloned()
    }

    /// Workflows that have not reached a terminal state, oldest first.
    pub fn get_active_workflows(&self) -> Vec<WorkflowRecord> {
        let mut active: Vec<WorkflowRecord> = self
            .read()
            .values()
            .filter(|wf| !wf.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        active
    }

    /// Drops every terminal workflow. Returns how many were removed.
    pub fn clear_completed_workflows(&self) -> usize {
        let mut workflows = self.write();
        let before = workflows.len();
        workflows.retain(|_, wf| !wf.is_terminal());
        before - workflows.len()
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Marks failed every processing photo that has no valid job id to
    /// follow. Never polls. Returns the number of photos marked.
    ///
    /// Photos whose workflow is still submitting are left alone.
    pub fn initialize_polling(&self) -> usize {
        let submitting: Vec<String> = self
            .read()
            .values()
            .filter(|wf| wf.status == WorkflowStatus::Started)
            .map(|wf| wf.photo_id.clone())
            .collect();

        let mut swept = 0;
        for photo in self.inner.cache.get_photos_by_status(PhotoStatus::Processing) {
            let has_job = photo.job_id().is_some_and(is_valid_job_id);
            if has_job || submitting.contains(&photo.id) {
                continue;
            }
            if self.inner.cache.mark_failed(&photo.id) {
                log::warn!("Photo {} is processing without a job, marked failed", photo.id);
                swept += 1;
            }
        }

        if swept > 0 {
            log::info!("Orphan sweep marked {} photos failed", swept);
        }
        swept
    }

    /// Polls every processing photo that carries a valid job id which is not
    /// permanently failed and not already polled. Jobs that belong to a known
    /// workflow keep driving it. Returns the number of jobs registered.
    pub fn resume_polling(&self) -> usize {
        let mut resumed = 0;
        for photo in self.inner.cache.get_photos_by_status(PhotoStatus::Processing) {
            let Some(job_id) = photo.job_id().filter(|id| is_valid_job_id(id)) else {
                continue;
            };
            let poller = &self.inner.poller;
            if poller.is_polling(job_id) || poller.is_permanently_failed(job_id) {
                continue;
            }

            let workflow = photo
                .metadata
                .workflow_id
                .as_deref()
                .and_then(|id| self.get_workflow(id))
                .filter(|wf| !wf.is_terminal());

            let started = match workflow {
                Some(wf) => {
                    self.register_polling(&wf.id, job_id);
                    poller.is_polling(job_id)
                }
                None => poller.start_polling(job_id, None).is_polling(),
            };
            if started {
                resumed += 1;
            }
        }

        log::info!("Resumed polling for {} jobs", resumed);
        resumed
    }

    /// Reacts to a session change. Signing out stops all polling and forgets
    /// every workflow; signing in resumes nothing on its own.
    pub fn handle_session_change(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedOut => {
                self.inner.poller.stop_all_polling();
                let dropped = {
                    let mut workflows = self.write();
                    let count = workflows.len();
                    workflows.clear();
                    count
                };
                log::info!("Signed out: stopped polling, dropped {} workflows", dropped);
            }
            SessionEvent::SignedIn => {
                log::debug!("Signed in");
            }
        }
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn insert(&self, workflow: WorkflowRecord) {
        let event = WorkflowEvent::from_record(&workflow);
        self.write().insert(workflow.id.clone(), workflow);
        self.inner.events.send(event);
    }

    /// Applies `f` to a workflow and broadcasts the new state.
    fn modify<F>(&self, workflow_id: &str, f: F)
    where
        F: FnOnce(&mut WorkflowRecord),
    {
        let event = {
            let mut workflows = self.write();
            let Some(workflow) = workflows.get_mut(workflow_id) else {
                return;
            };
            f(workflow);
            WorkflowEvent::from_record(workflow)
        };
        self.inner.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, WorkflowRecord>> {
        match self.inner.workflows.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Workflow lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, WorkflowRecord>> {
        match self.inner.workflows.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Workflow lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn upgrade(weak: &Weak<OrchestratorInner>) -> Option<WorkflowOrchestrator> {
    weak.upgrade().map(|inner| WorkflowOrchestrator { inner })
}
