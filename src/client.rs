//! HTTP client for the three App Center endpoints the actions use.

use std::fmt;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HOST, HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{AppCenterError, Result};
use crate::signer::{sign_bytes, signature_header_value};
use crate::{Credentials, PlatformConfig};

const APPLICATION_JSON: &str = "application/json";

/// Remote operations, used to pick the response field that signals failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListApps,
    BuildApp,
    SendWebhook,
}

impl Operation {
    /// Body field whose truthy presence marks the call as failed.
    ///
    /// The public hook endpoint reports failures under `message` while the
    /// authenticated endpoints use `error`. Kept as observed upstream.
    pub const fn error_field(self) -> &'static str {
        match self {
            Operation::ListApps => "error",
            Operation::BuildApp => "error",
            Operation::SendWebhook => "message",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ListApps => "list apps",
            Operation::BuildApp => "build trigger",
            Operation::SendWebhook => "webhook delivery",
        };
        f.write_str(name)
    }
}

/// Body of a build trigger request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub source_version: String,
    pub debug: bool,
}

impl BuildRequest {
    /// Release build of the given commit.
    pub fn for_commit(source_version: impl Into<String>) -> Self {
        Self {
            source_version: source_version.into(),
            debug: false,
        }
    }
}

/// JavaScript truthiness, which is how the platform's own tooling reads
/// its error fields.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone)]
pub struct AppCenterClient {
    http: reqwest::Client,
    base_url: Url,
    config: PlatformConfig,
}

impl AppCenterClient {
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Self::with_http_client(http, config)
    }

    pub fn with_http_client(http: reqwest::Client, config: PlatformConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppCenterError::ConfigError(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppCenterError::ConfigError(format!(
                "Base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// GET `/orgs/{org}/apps`. Returns the raw app objects.
    pub async fn list_apps(&self, org_name: &str, credentials: &Credentials) -> Result<Vec<Value>> {
        let operation = Operation::ListApps;
        let url = self.endpoint(&["orgs", org_name, "apps"]);
        debug!("GET {}", url);

        let request = self
            .http
            .get(url)
            .headers(self.base_headers(credentials)?);

        let (status, json) = self.send_json(operation, request).await?;
        match json {
            Value::Array(apps) => Ok(apps),
            other => Err(AppCenterError::InvalidResponse {
                operation,
                status,
                message: format!("expected a JSON array of apps, got {}", other),
            }),
        }
    }

    /// POST `/apps/{org}/{app}/branches/{branch}/builds`.
    pub async fn build_app(
        &self,
        app_name: &str,
        org_name: &str,
        branch_name: &str,
        build_params: &BuildRequest,
        credentials: &Credentials,
        extra_headers: &HeaderMap,
    ) -> Result<Value> {
        let url = self.endpoint(&[
            "apps",
            org_name,
            app_name,
            "branches",
            branch_name,
            "builds",
        ]);
        debug!("POST {}", url);

        let mut headers = self.base_headers(credentials)?;
        headers.extend(extra_headers.clone());

        let request = self.http.post(url).headers(headers).json(build_params);
        self.execute(Operation::BuildApp, request).await
    }

    /// POST `/public/apps/{app_id}/hooks` with `payload` signed by `app_secret`.
    ///
    /// The payload is serialized once; the signed bytes are the bytes sent.
    pub async fn send_webhook(
        &self,
        app_id: &str,
        app_secret: &str,
        payload: &Value,
        credentials: &Credentials,
        extra_headers: &HeaderMap,
    ) -> Result<Value> {
        let url = self.endpoint(&["public", "apps", app_id, "hooks"]);
        debug!("POST {}", url);

        let body = serde_json::to_vec(payload)?;
        let signature = signature_header_value(&sign_bytes(&body, app_secret)?);

        let mut headers = self.base_headers(credentials)?;
        headers.insert(
            header_name(&self.config.signature_header)?,
            header_value(&signature)?,
        );
        headers.insert(HOST, header_value(&self.config.webhook_host)?);
        headers.extend(extra_headers.clone());

        let request = self.http.post(url).headers(headers).body(body);
        self.execute(Operation::SendWebhook, request).await
    }

    /// `{base_url}/{api_version}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(&self.config.api_version)
                .extend(segments);
        }
        url
    }

    fn base_headers(&self, credentials: &Credentials) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

        let mut token = header_value(credentials.api_token())?;
        token.set_sensitive(true);
        headers.insert(header_name(&self.config.token_header)?, token);
        Ok(headers)
    }

    async fn execute(&self, operation: Operation, request: RequestBuilder) -> Result<Value> {
        let (_, json) = self.send_json(operation, request).await?;
        Ok(json)
    }

    /// Sends the request and judges it by body shape only, never by status.
    async fn send_json(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<(u16, Value)> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let json: Value =
            serde_json::from_slice(&body).map_err(|e| AppCenterError::InvalidResponse {
                operation,
                status,
                message: format!("body is not JSON: {}", e),
            })?;

        if let Some(signal) = json.get(operation.error_field()).filter(|v| is_truthy(v)) {
            let message = match signal {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(AppCenterError::RemoteApi { operation, message });
        }

        debug!("{} answered with HTTP {}", operation, status);
        Ok((status, json))
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| AppCenterError::InvalidHeader(format!("'{}': {}", name, e)))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AppCenterError::InvalidHeader(e.to_string()))
}
