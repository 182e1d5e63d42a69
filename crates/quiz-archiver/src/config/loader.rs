use std::path::Path;

use crate::config::schema::ArchiverConfig;
use crate::error::ConfigError;
use crate::filename::{is_valid_archive_pattern, is_valid_attempt_pattern};

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ArchiverConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ArchiverConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: ArchiverConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let compiled =
        jsonschema::JSONSchema::compile(&schema).map_err(|e| ConfigError::Validation {
            message: format!("Failed to compile JSON schema: {}", e),
        })?;

    let result = compiled.validate(json_value);
    if let Err(errors) = result {
        let error_messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that go beyond what the JSON schema can express.
pub fn validate_config(config: &ArchiverConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !is_valid_archive_pattern(&config.jobs.archive_filename_pattern) {
        return Err(ConfigError::InvalidPattern {
            name: "archive_filename_pattern".to_string(),
            reason: "unknown variable or forbidden character".to_string(),
        });
    }
    if !is_valid_attempt_pattern(&config.jobs.attempt_filename_pattern) {
        return Err(ConfigError::InvalidPattern {
            name: "attempt_filename_pattern".to_string(),
            reason: "unknown variable or forbidden character".to_string(),
        });
    }

    if config.jobs.timeout_minutes < 0 {
        return Err(ConfigError::Validation {
            message: "jobs.timeout_minutes must not be negative".to_string(),
        });
    }
    if config.jobs.temporary_file_max_age_seconds < 0 {
        return Err(ConfigError::Validation {
            message: "jobs.temporary_file_max_age_seconds must not be negative".to_string(),
        });
    }

    if config.signing.enabled {
        let has_url = config
            .signing
            .server_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        if !has_url {
            return Err(ConfigError::Validation {
                message: "signing.server_url is required when signing is enabled".to_string(),
            });
        }
    }

    Ok(())
}
