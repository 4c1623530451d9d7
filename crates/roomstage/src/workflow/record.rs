//! Workflow record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of user-initiated request a workflow tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    RoomCreation,
    StyleApplication,
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowType::RoomCreation => write!(f, "room_creation"),
            WorkflowType::StyleApplication => write!(f, "style_application"),
        }
    }
}

/// Workflow state.
///
/// `started -> processing -> [emptying ->] completed`, or `failed`/`error`
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Started,
    Processing,
    Emptying,
    Completed,
    /// The submission itself was rejected.
    Error,
    /// The submitted job failed, or the workflow was marked failed.
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Error | WorkflowStatus::Failed
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Started => write!(f, "started"),
            WorkflowStatus::Processing => write!(f, "processing"),
            WorkflowStatus::Emptying => write!(f, "emptying"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Error => write!(f, "error"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One user-initiated transformation, bound to exactly one photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub photo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn new(workflow_type: WorkflowType, photo_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_type,
            photo_id: photo_id.to_string(),
            job_id: None,
            status: WorkflowStatus::Started,
            target_style: None,
            room_type: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn transition(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_workflow_starts() {
        let wf = WorkflowRecord::new(WorkflowType::RoomCreation, "p1");
        assert_eq!(wf.status, WorkflowStatus::Started);
        assert!(!wf.is_terminal());
        assert!(wf.job_id.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Error.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::Emptying.is_terminal());
        assert!(!WorkflowStatus::Processing.is_terminal());
    }

    #[test]
    fn test_serializes_type_field() {
        let wf = WorkflowRecord::new(WorkflowType::StyleApplication, "p1");
        let json = serde_json::to_value(&wf).unwrap();
        assert_eq!(json["type"], "style_application");
        assert_eq!(json["photoId"], "p1");
        assert_eq!(json["status"], "started");
    }
}
