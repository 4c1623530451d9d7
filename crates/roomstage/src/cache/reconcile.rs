//! Merging remote job snapshots into local photo records.

use crate::engine::{JobRecord, RemoteJobStatus};

use super::record::{PhotoRecord, PhotoStatus};

/// Result of reconciling one job snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No local record belongs to the job.
    NoMatch,
    /// A record matched but the snapshot carried nothing new.
    Unchanged,
    /// A record matched and was updated (and persisted).
    Updated(PhotoRecord),
}

impl ReconcileOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, ReconcileOutcome::Updated(_))
    }
}

/// Public URL of a storage path: `{base}/{path}` with exactly one slash in
/// between. Absolute http(s) paths are returned as-is.
pub fn public_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Local status a remote status maps to.
pub fn local_status(status: RemoteJobStatus) -> PhotoStatus {
    match status {
        RemoteJobStatus::Done => PhotoStatus::Completed,
        RemoteJobStatus::Error => PhotoStatus::Failed,
        RemoteJobStatus::Processing => PhotoStatus::Processing,
    }
}

/// Finds the index of the record a job belongs to.
///
/// Match order: bound job id, exact public URL of the original, original
/// path as a substring of the URL, record id equal to the job id.
pub(crate) fn find_match(photos: &[PhotoRecord], job: &JobRecord, base: &str) -> Option<usize> {
    if let Some(idx) = photos
        .iter()
        .position(|p| p.metadata.job_id.as_deref() == Some(job.id.as_str()))
    {
        return Some(idx);
    }

    let url = public_url(base, &job.original_path);
    if let Some(idx) = photos.iter().position(|p| p.original_url == url) {
        return Some(idx);
    }

    if !job.original_path.is_empty() {
        if let Some(idx) = photos
            .iter()
            .position(|p| p.original_url.contains(job.original_path.as_str()))
        {
            return Some(idx);
        }
    }

    photos.iter().position(|p| p.id == job.id)
}

/// Applies a snapshot to a record. Result URLs and style are only filled
/// when still unset; the status is always recomputed. Returns true if
/// anything changed.
pub(crate) fn merge(record: &mut PhotoRecord, job: &JobRecord, base: &str) -> bool {
    let mut changed = false;

    if record.empty_url.is_none() {
        if let Some(path) = job.empty_path.as_deref() {
            record.empty_url = Some(public_url(base, path));
            changed = true;
        }
    }

    if record.styled_url.is_none() {
        if let Some(path) = job.styled_path.as_deref() {
            record.styled_url = Some(public_url(base, path));
            changed = true;
        }
    }

    if record.style.is_none() {
        if let Some(style) = job.applied_style.as_deref() {
            record.style = Some(style.to_string());
            changed = true;
        }
    }

    let status = local_status(job.status);
    if record.status != status {
        record.status = status;
        changed = true;
    }

    changed
}
