pub mod apps;
pub mod client;
pub mod error;
pub mod event;
pub mod logging;
pub mod runner;
pub mod signer;
pub mod utils;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AppCenterError, Result};
use crate::logging::LogRotation;

pub const DEFAULT_BASE_URL: &str = "https://api.appcenter.ms";
pub const DEFAULT_API_VERSION: &str = "v0.1";
pub const DEFAULT_WEBHOOK_HOST: &str = "api.appcenter.ms";
pub const DEFAULT_TOKEN_HEADER: &str = "X-API-Token";
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Where and how to reach the platform API. Every field has a default
/// pointing at App Center, so the TOML file only lists overrides.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub api_version: String,
    /// Value of the fixed `host` header sent with webhook deliveries
    pub webhook_host: String,
    pub token_header: String,
    pub signature_header: String,
    /// Sent with every build trigger and webhook delivery
    pub extra_headers: BTreeMap<String, String>,
    pub log_directory: Option<PathBuf>,
    pub log_rotation: LogRotation,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            webhook_host: DEFAULT_WEBHOOK_HOST.to_string(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            extra_headers: BTreeMap::new(),
            log_directory: None,
            log_rotation: LogRotation::default(),
        }
    }
}

impl PlatformConfig {
    /// Returns `extra_headers` as a validated header map.
    pub fn extra_header_map(&self) -> Result<HeaderMap> {
        to_header_map(&self.extra_headers)
    }
}

/// Converts string pairs into a `HeaderMap`, rejecting invalid names or values.
pub fn to_header_map<'a, I>(headers: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppCenterError::InvalidHeader(format!("'{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppCenterError::InvalidHeader(format!("value of '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Load and parse the platform configuration file
pub fn load_config(path: &Path) -> Result<PlatformConfig> {
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        AppCenterError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: PlatformConfig = toml::from_str(&config_str).map_err(|e| {
        AppCenterError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(config)
}

/// API token shared read-only by every call of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_token: String,
}

impl Credentials {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
        }
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Immutable per-run configuration handed to the runner.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    pub credentials: Credentials,
    pub organization_name: String,
}

impl ActionConfig {
    /// Both inputs are required and must not be blank.
    pub fn new(api_token: impl Into<String>, organization_name: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        let organization_name = organization_name.into();
        if api_token.trim().is_empty() {
            return Err(AppCenterError::ConfigError(
                "API token must not be empty".to_string(),
            ));
        }
        if organization_name.trim().is_empty() {
            return Err(AppCenterError::ConfigError(
                "Organization name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            credentials: Credentials::new(api_token),
            organization_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_url = "http://localhost:9000"

[extra_headers]
X-Trace = "on"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.webhook_host, DEFAULT_WEBHOOK_HOST);
        assert_eq!(config.extra_headers.get("X-Trace").map(String::as_str), Some("on"));
        assert!(config.log_directory.is_none());
        assert_eq!(config.log_rotation, LogRotation::Daily);

        let headers = config.extra_header_map().unwrap();
        assert_eq!(headers.get("x-trace").unwrap(), "on");
    }

    #[test]
    fn test_load_config_log_file_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_directory = "/var/log/appcenter"
log_rotation = "hourly"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.log_directory, Some(PathBuf::from("/var/log/appcenter")));
        assert_eq!(config.log_rotation, LogRotation::Hourly);
    }

    #[test]
    fn test_load_config_rejects_unknown_rotation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"log_rotation = "weekly""#).unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(AppCenterError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, AppCenterError::ConfigError(_)));
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = [").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, AppCenterError::ConfigError(_)));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_invalid_extra_header_is_rejected() {
        let mut config = PlatformConfig::default();
        config
            .extra_headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            config.extra_header_map(),
            Err(AppCenterError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_action_config_requires_inputs() {
        assert!(ActionConfig::new("", "org").is_err());
        assert!(ActionConfig::new("token", "  ").is_err());
        let config = ActionConfig::new("token", "org").unwrap();
        assert_eq!(config.credentials.api_token(), "token");
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("\"token\""));
    }
}
