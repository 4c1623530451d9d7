//! Photo record types stored by the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local status of a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    Processing,
    Completed,
    Failed,
}

impl PhotoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Processing => "processing",
            PhotoStatus::Completed => "completed",
            PhotoStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhotoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhotoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(PhotoStatus::Processing),
            "completed" => Ok(PhotoStatus::Completed),
            "failed" => Ok(PhotoStatus::Failed),
            other => Err(format!("unknown photo status '{}'", other)),
        }
    }
}

/// Binding between a photo and the remote job/workflow working on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// A locally known photo.
///
/// Only `status`, the result URLs, `style` and the metadata binding change
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styled_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    pub status: PhotoStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: PhotoMetadata,
}

impl PhotoRecord {
    /// Creates a new processing record with a fresh id.
    pub fn new(original_url: impl Into<String>, room_type: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_url: original_url.into(),
            empty_url: None,
            styled_url: None,
            style: None,
            room_type,
            status: PhotoStatus::Processing,
            created_at: Utc::now(),
            metadata: PhotoMetadata::default(),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        self.metadata.job_id.as_deref()
    }
}

/// Partial update of the mutable fields of a [`PhotoRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoPatch {
    pub status: Option<PhotoStatus>,
    pub empty_url: Option<String>,
    pub styled_url: Option<String>,
    pub style: Option<String>,
    pub job_id: Option<String>,
    pub workflow_id: Option<String>,
}

impl PhotoPatch {
    pub fn status(status: PhotoStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_empty_url(mut self, url: impl Into<String>) -> Self {
        self.empty_url = Some(url.into());
        self
    }

    pub fn with_styled_url(mut self, url: impl Into<String>) -> Self {
        self.styled_url = Some(url.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_job(mut self, job_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Applies the patch. Returns true if any field changed.
    pub(crate) fn apply(self, record: &mut PhotoRecord) -> bool {
        let mut changed = false;
        changed |= set_if_changed(&mut record.status, self.status);
        changed |= set_opt_if_changed(&mut record.empty_url, self.empty_url);
        changed |= set_opt_if_changed(&mut record.styled_url, self.styled_url);
        changed |= set_opt_if_changed(&mut record.style, self.style);
        changed |= set_opt_if_changed(&mut record.metadata.job_id, self.job_id);
        changed |= set_opt_if_changed(&mut record.metadata.workflow_id, self.workflow_id);
        changed
    }
}

fn set_if_changed<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(v) if *slot != v => {
            *slot = v;
            true
        }
        _ => false,
    }
}

fn set_opt_if_changed<T: PartialEq>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) if slot.as_ref() != Some(&v) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

/// Totals per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhotoCounts {
    pub total: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
