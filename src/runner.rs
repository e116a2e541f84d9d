//! Fan-out of one remote call per organization app.
//!
//! ```text
//! Listing ──ok──▶ Dispatching ──all joined──▶ Done
//!    │
//!    └──err──▶ Aborted
//! ```
//!
//! Listing failure is fatal for the run. Every dispatch runs as its own task
//! and a failed dispatch is logged and skipped; it never stops its siblings.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ActionConfig;
use crate::apps::{AppSummary, summarize_apps};
use crate::client::{AppCenterClient, BuildRequest};
use crate::error::{DispatchError, ListError, Result};
use crate::event::BuildTrigger;

/// Header naming the GitHub event kind of a forwarded payload
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";

/// The per-app remote operation a run fans out.
#[async_trait]
pub trait AppDispatcher: Send + Sync + 'static {
    /// Phrase used in log lines, e.g. "sending build request"
    fn action(&self) -> &'static str;

    async fn dispatch(
        &self,
        client: &AppCenterClient,
        config: &ActionConfig,
        app: &AppSummary,
    ) -> Result<Value>;
}

/// Triggers a build of the pushed commit on every app.
#[derive(Debug, Clone)]
pub struct BuildDispatcher {
    trigger: BuildTrigger,
    build_request: BuildRequest,
    extra_headers: HeaderMap,
}

impl BuildDispatcher {
    pub fn new(trigger: BuildTrigger, extra_headers: HeaderMap) -> Self {
        let build_request = BuildRequest::for_commit(trigger.source_version.clone());
        Self {
            trigger,
            build_request,
            extra_headers,
        }
    }
}

#[async_trait]
impl AppDispatcher for BuildDispatcher {
    fn action(&self) -> &'static str {
        "sending build request"
    }

    async fn dispatch(
        &self,
        client: &AppCenterClient,
        config: &ActionConfig,
        app: &AppSummary,
    ) -> Result<Value> {
        client
            .build_app(
                app.require_name()?,
                &config.organization_name,
                &self.trigger.branch,
                &self.build_request,
                &config.credentials,
                &self.extra_headers,
            )
            .await
    }
}

/// Forwards the push payload, signed with each app's own secret.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    payload: Value,
    extra_headers: HeaderMap,
}

impl WebhookDispatcher {
    /// Marks the delivery as a `push` event unless the caller already set
    /// the event header.
    pub fn new(payload: Value, mut extra_headers: HeaderMap) -> Self {
        extra_headers
            .entry(HeaderName::from_static(GITHUB_EVENT_HEADER))
            .or_insert(HeaderValue::from_static("push"));
        Self {
            payload,
            extra_headers,
        }
    }
}

#[async_trait]
impl AppDispatcher for WebhookDispatcher {
    fn action(&self) -> &'static str {
        "forwarding webhook"
    }

    async fn dispatch(
        &self,
        client: &AppCenterClient,
        config: &ActionConfig,
        app: &AppSummary,
    ) -> Result<Value> {
        client
            .send_webhook(
                app.require_id()?,
                app.require_secret()?,
                &self.payload,
                &config.credentials,
                &self.extra_headers,
            )
            .await
    }
}

/// Result of a single app's dispatch
#[derive(Debug)]
pub enum DispatchOutcome {
    Succeeded { display_name: String, response: Value },
    Failed(DispatchError),
    /// The task panicked before reporting; the app is unknown
    Panicked(String),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Succeeded { .. })
    }
}

/// Outcomes of a completed run, in completion order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl RunReport {
    pub fn dispatched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.dispatched() - self.succeeded()
    }
}

pub struct FanOutRunner {
    client: Arc<AppCenterClient>,
    config: Arc<ActionConfig>,
}

impl FanOutRunner {
    pub fn new(client: AppCenterClient, config: ActionConfig) -> Self {
        Self {
            client: Arc::new(client),
            config: Arc::new(config),
        }
    }

    /// List the organization's apps, then dispatch to each of them
    /// concurrently and wait for every dispatch to finish.
    pub async fn run<D: AppDispatcher>(
        &self,
        dispatcher: D,
    ) -> std::result::Result<RunReport, ListError> {
        let organization = &self.config.organization_name;

        let raw_apps = match self
            .client
            .list_apps(organization, &self.config.credentials)
            .await
        {
            Ok(apps) => apps,
            Err(e) => {
                let err = ListError {
                    organization: organization.clone(),
                    source: e,
                };
                error!("Failure in getting apps, aborting: {}", err);
                return Err(err);
            }
        };

        let apps = summarize_apps(&raw_apps);
        debug!("Organization '{}' has {} apps", organization, apps.len());

        let dispatcher = Arc::new(dispatcher);
        let mut join_set = JoinSet::new();

        for app in apps {
            info!("Evaluating app {}", app.display_name);

            let dispatcher = Arc::clone(&dispatcher);
            let client = Arc::clone(&self.client);
            let config = Arc::clone(&self.config);

            join_set.spawn(async move {
                let action = dispatcher.action();
                let result = dispatcher.dispatch(&client, &config, &app).await;
                match result {
                    Ok(response) => {
                        info!(
                            "Success in {} for app {}: {}",
                            action, app.display_name, response
                        );
                        DispatchOutcome::Succeeded {
                            display_name: app.display_name,
                            response,
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Found an error while {} for app {}, skipping: {}",
                            action, app.display_name, e
                        );
                        DispatchOutcome::Failed(DispatchError {
                            display_name: app.display_name,
                            source: e,
                        })
                    }
                }
            });
        }

        let mut report = RunReport::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!("Dispatch task panicked: {}", e);
                    report.outcomes.push(DispatchOutcome::Panicked(e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
