use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum RoomstageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Job engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid URL for '{field}': {value}")]
    InvalidUrl { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The engine rejected the submission or could not be reached. The bound
    /// photo has already been marked failed.
    #[error("Submission failed for workflow {workflow_id}: {source}")]
    Submission {
        workflow_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Photo not found: {0}")]
    PhotoNotFound(String),
}

pub type Result<T> = std::result::Result<T, RoomstageError>;
