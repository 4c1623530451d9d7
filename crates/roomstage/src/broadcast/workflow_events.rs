//! Workflow state-change broadcaster.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::workflow::{WorkflowRecord, WorkflowStatus, WorkflowType};

/// Emitted whenever a workflow changes state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub photo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn from_record(record: &WorkflowRecord) -> Self {
        Self {
            workflow_id: record.id.clone(),
            workflow_type: record.workflow_type,
            photo_id: record.photo_id.clone(),
            job_id: record.job_id.clone(),
            status: record.status,
            error: record.error.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Clone)]
pub struct WorkflowEventBroadcaster {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for WorkflowEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
