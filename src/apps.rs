//! Per-app records derived from the organization's app list.

use serde_json::Value;

use crate::error::{AppCenterError, Result};

const UNNAMED_APP: &str = "<unnamed app>";

/// The parts of a platform app object needed to dispatch to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSummary {
    /// URL name, used by the build endpoint
    pub app_name: Option<String>,
    /// Platform id, used by the public hook endpoint
    pub app_id: Option<String>,
    pub display_name: String,
    pub app_secret: Option<String>,
}

impl AppSummary {
    /// Build a summary from one raw app object. Missing or non-scalar
    /// fields become `None` so the failure surfaces at dispatch time.
    pub fn from_raw(raw: &Value) -> Self {
        let app_name = scalar_field(raw, "name");
        let app_id = scalar_field(raw, "id");
        let display_name = scalar_field(raw, "display_name")
            .or_else(|| app_name.clone())
            .or_else(|| app_id.clone())
            .unwrap_or_else(|| UNNAMED_APP.to_string());

        Self {
            app_name,
            app_id,
            display_name,
            app_secret: scalar_field(raw, "app_secret"),
        }
    }

    pub fn require_name(&self) -> Result<&str> {
        self.app_name
            .as_deref()
            .ok_or(AppCenterError::MissingField { field: "name" })
    }

    pub fn require_id(&self) -> Result<&str> {
        self.app_id
            .as_deref()
            .ok_or(AppCenterError::MissingField { field: "id" })
    }

    pub fn require_secret(&self) -> Result<&str> {
        self.app_secret
            .as_deref()
            .ok_or(AppCenterError::MissingField { field: "app_secret" })
    }
}

/// Maps the raw roster to summaries, one per entry, order preserved.
pub fn summarize_apps(raw_apps: &[Value]) -> Vec<AppSummary> {
    raw_apps.iter().map(AppSummary::from_raw).collect()
}

/// Strings are taken as-is, numbers rendered in decimal; empty strings,
/// nulls and structured values count as absent.
fn scalar_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
