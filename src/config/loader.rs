//! Configuration file loading and parsing.

use std::path::Path;

use anyhow::{Context, Result};

use super::model::AppConfig;
use crate::error::ConfigError;
use crate::validation::validate_config;

/// Loads the configuration file from disk and parses it.
///
/// An empty file yields the defaults.
pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    if content.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let config: AppConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(config)
}

/// Loads and fully validates the configuration file.
///
/// `require_endpoint` is false for dry runs and for commands that never submit.
pub fn load_and_validate(path: &Path, require_endpoint: bool) -> Result<AppConfig> {
    let config = load_from_path(path).context("Failed to load configuration")?;
    check(&config, require_endpoint)?;
    Ok(config)
}

/// Validates an already-parsed configuration, logging warnings.
pub fn check(config: &AppConfig, require_endpoint: bool) -> Result<(), ConfigError> {
    let report = validate_config(config, require_endpoint);

    for issue in report.warnings() {
        tracing::warn!(
            field = issue.field.path(),
            message = %issue.message,
            hint = ?issue.hint,
            "Config validation warning"
        );
    }

    if !report.is_valid() {
        tracing::error!(report = %report, "Config validation failed");
        return Err(ConfigError::ValidationFailed {
            error_count: report.rejection_count(),
        });
    }

    Ok(())
}
