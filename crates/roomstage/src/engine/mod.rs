//! Client side of the remote AI job engine.
//!
//! The engine is opaque: it accepts an image submission, hands back a job
//! id, and later reports the job's status and result paths. Everything in
//! this crate talks to it through [`JobEngine`] so tests can script it.

pub mod error;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::EngineError;
pub use http::HttpEngine;

/// Remote job status as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobStatus {
    Done,
    Error,
    /// Anything the engine reports that is not `done` or `error` is treated
    /// as still running.
    #[serde(other)]
    Processing,
}

impl RemoteJobStatus {
    /// Returns true once the engine will not change the job any more.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteJobStatus::Done | RemoteJobStatus::Error)
    }
}

impl std::fmt::Display for RemoteJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteJobStatus::Processing => write!(f, "processing"),
            RemoteJobStatus::Done => write!(f, "done"),
            RemoteJobStatus::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of a remote job. Field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Server-issued UUID v4.
    pub id: String,
    pub status: RemoteJobStatus,
    /// Storage path of the uploaded source image.
    pub original_path: String,
    /// Storage path of the emptied-room result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_path: Option<String>,
    /// Storage path of the styled result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styled_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_style: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Parameters of one submission to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Local path (or `file://` URI) of the image to upload.
    pub image_uri: String,
    pub room_type: Option<String>,
    pub style: Option<String>,
    pub quality: String,
}

/// Response of the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "jobId", alias = "job_id")]
    pub job_id: String,
}

/// The remote engine's two endpoints.
#[async_trait]
pub trait JobEngine: Send + Sync {
    /// Uploads an image and starts a job. No retry is attempted.
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, EngineError>;

    /// Fetches the current snapshot of a job. `Ok(None)` means the engine
    /// does not know the job.
    async fn get_status(&self, job_id: &str) -> Result<Option<JobRecord>, EngineError>;
}
