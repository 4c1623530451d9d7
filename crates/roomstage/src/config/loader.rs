use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Returns the canonical config path: `~/.roomstage/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".roomstage").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    validate_http_url("engine.base_url", &config.engine.base_url)?;
    validate_http_url("storage.public_base_url", &config.storage.public_base_url)?;

    let polling = &config.polling;
    if polling.interval_secs == 0 || polling.session_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "Polling durations must be greater than zero".to_string(),
        });
    }
    if polling.session_timeout_secs < polling.interval_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "polling.session_timeout_secs ({}) is shorter than polling.interval_secs ({})",
                polling.session_timeout_secs, polling.interval_secs
            ),
        });
    }
    if polling.max_consecutive_failures == 0 {
        return Err(ConfigError::Validation {
            message: "polling.max_consecutive_failures must be at least 1".to_string(),
        });
    }

    if config.engine.connect_timeout_secs == 0 || config.engine.request_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "Engine timeouts must be greater than zero".to_string(),
        });
    }

    Ok(())
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}
