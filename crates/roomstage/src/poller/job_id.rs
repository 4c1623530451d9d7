//! Job id gate: only UUID v4 ids issued by the engine are ever polled.

use std::sync::LazyLock;

use regex::Regex;

static RE_UUID_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").unwrap()
});

/// Returns true if `job_id` is a UUID v4 (any letter case).
pub fn is_valid_job_id(job_id: &str) -> bool {
    RE_UUID_V4.is_match(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_v4() {
        assert!(is_valid_job_id("0b7e8f3c-2a9d-4c1e-9f6a-3d2b1c0a9e8f"));
        assert!(is_valid_job_id("0B7E8F3C-2A9D-4C1E-BF6A-3D2B1C0A9E8F"));
        assert!(is_valid_job_id(&uuid::Uuid::new_v4().to_string()));
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("job-123"));
        // version 1
        assert!(!is_valid_job_id("0b7e8f3c-2a9d-1c1e-9f6a-3d2b1c0a9e8f"));
        // bad variant nibble
        assert!(!is_valid_job_id("0b7e8f3c-2a9d-4c1e-cf6a-3d2b1c0a9e8f"));
        // no hyphens
        assert!(!is_valid_job_id("0b7e8f3c2a9d4c1e9f6a3d2b1c0a9e8f"));
        assert!(!is_valid_job_id(" 0b7e8f3c-2a9d-4c1e-9f6a-3d2b1c0a9e8f"));
    }
}
