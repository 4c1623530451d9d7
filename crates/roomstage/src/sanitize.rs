//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Local image locations and signed storage URLs stay out of spans; only the
//! file name is recorded.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns the file name of an image URI: a local path, a `file://` URI or
/// an http(s) URL. Query strings and fragments are dropped.
///
/// - `file:///home/me/Pictures/room.jpg` → `room.jpg`
/// - `https://cdn.example.com/empty/1.jpg?token=abc` → `1.jpg`
pub fn redact_uri(uri: &str) -> String {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    let path = without_query
        .strip_prefix("file://")
        .or_else(|| without_query.strip_prefix("https://"))
        .or_else(|| without_query.strip_prefix("http://"))
        .unwrap_or(without_query);
    redact_path(Path::new(path))
}
