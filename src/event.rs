//! Trigger context read from the GitHub Actions event file

use serde_json::Value;
use std::path::Path;

use crate::error::{AppCenterError, Result};
use crate::utils::short_branch_name;

/// Environment variable holding the path of the event payload file
pub const EVENT_PATH_VAR: &str = "GITHUB_EVENT_PATH";

/// Read the event payload. Key order is preserved so a forwarded payload
/// serializes the way it was received.
pub fn load_event(path: &Path) -> Result<Value> {
    let raw = std::fs::read(path).map_err(|e| {
        AppCenterError::ConfigError(format!(
            "Failed to read event payload '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Branch and commit a build run triggers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTrigger {
    /// Short branch name, e.g. `feature/login`
    pub branch: String,
    pub source_version: String,
}

impl BuildTrigger {
    /// Take `ref` and `head_commit.id` from the push payload, falling back
    /// to the explicitly supplied values when the payload lacks them.
    pub fn resolve(
        payload: Option<&Value>,
        fallback_ref: Option<&str>,
        fallback_commit: Option<&str>,
    ) -> Result<Self> {
        let full_ref = payload
            .and_then(|p| p.get("ref"))
            .and_then(Value::as_str)
            .or(fallback_ref)
            .ok_or_else(|| {
                AppCenterError::ConfigError("No ref in push event and none supplied".to_string())
            })?;

        let source_version = payload
            .and_then(|p| p.get("head_commit"))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .or(fallback_commit)
            .ok_or_else(|| {
                AppCenterError::ConfigError(
                    "No head commit in push event and none supplied".to_string(),
                )
            })?;

        Ok(Self {
            branch: short_branch_name(full_ref),
            source_version: source_version.to_string(),
        })
    }
}
