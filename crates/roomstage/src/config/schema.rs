use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
}

/// Remote job engine endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL result paths are published under.
    pub public_base_url: String,
    /// SQLite file; defaults to `~/.roomstage/data/roomstage.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    /// Keep the permanently-failed job ids across restarts.
    #[serde(default)]
    pub persist_failed_jobs: bool,
}

fn default_interval() -> u64 {
    5
}

fn default_session_timeout() -> u64 {
    600
}

fn default_max_failures() -> u32 {
    3
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            session_timeout_secs: default_session_timeout(),
            max_consecutive_failures: default_max_failures(),
            persist_failed_jobs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_quality")]
    pub quality: String,
}

fn default_quality() -> String {
    "standard".to_string()
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
        }
    }
}
