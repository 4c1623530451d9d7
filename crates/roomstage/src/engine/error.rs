//! Job engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from talking to the remote job engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The HTTP request itself failed (network, DNS, TLS, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine answered with a non-2xx status code.
    #[error("Job engine error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The image to upload could not be read.
    #[error("Failed to read image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine answered with something that is not a usable response.
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}
