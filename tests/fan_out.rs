use appcenter_actions::client::AppCenterClient;
use appcenter_actions::error::AppCenterError;
use appcenter_actions::event::BuildTrigger;
use appcenter_actions::runner::{BuildDispatcher, DispatchOutcome, FanOutRunner, WebhookDispatcher};
use appcenter_actions::signer::{sign, verify_signature};
use appcenter_actions::{ActionConfig, PlatformConfig};
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Keeps the crate's log events so tests can assert on what a run reported.
#[derive(Clone, Default)]
struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    /// Routes this thread's events here until the guard drops. The tests run
    /// on a current-thread runtime, so spawned dispatches log here too.
    fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    fn count(&self, level: Level, needle: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, message)| *l == level && message.contains(needle))
            .count()
    }

    fn count_level(&self, level: Level) -> usize {
        self.count(level, "")
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !event.metadata().target().starts_with("appcenter_actions") {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.message));
    }
}

async fn mount_roster(server: &MockServer, roster: Value) {
    Mock::given(method("GET"))
        .and(path("/v0.1/orgs/acme/apps"))
        .and(header("X-API-Token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roster))
        .expect(1)
        .mount(server)
        .await;
}

fn runner_for(server: &MockServer) -> FanOutRunner {
    let client = AppCenterClient::new(PlatformConfig {
        base_url: server.uri(),
        ..PlatformConfig::default()
    })
    .unwrap();
    FanOutRunner::new(client, ActionConfig::new("tok", "acme").unwrap())
}

#[tokio::test(flavor = "current_thread")]
async fn build_is_triggered_for_every_app() {
    let server = MockServer::start().await;
    mount_roster(&server, json!([{"name": "A", "id": 1}, {"name": "B", "id": 2}])).await;

    for app in ["A", "B"] {
        Mock::given(method("POST"))
            .and(path(format!("/v0.1/apps/acme/{}/branches/main/builds", app)))
            .and(header("X-API-Token", "tok"))
            .and(body_json(json!({"sourceVersion": "abc123", "debug": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"buildNumber": "1"})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let payload = json!({"ref": "refs/heads/main", "head_commit": {"id": "abc123"}});
    let trigger = BuildTrigger::resolve(Some(&payload), None, None).unwrap();

    let report = runner_for(&server)
        .run(BuildDispatcher::new(trigger, HeaderMap::new()))
        .await
        .unwrap();

    assert_eq!(report.dispatched(), 2);
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn failing_build_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    mount_roster(
        &server,
        json!([
            {"name": "A", "display_name": "App A"},
            {"name": "B", "display_name": "App B"},
            {"name": "C", "display_name": "App C"}
        ]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/v0.1/apps/acme/B/branches/develop/builds"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": {"code": "NotFound", "message": "No branch"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    for app in ["A", "C"] {
        Mock::given(method("POST"))
            .and(path(format!("/v0.1/apps/acme/{}/branches/develop/builds", app)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let trigger = BuildTrigger::resolve(None, Some("refs/heads/develop"), Some("f00d")).unwrap();
    let report = runner_for(&server)
        .run(BuildDispatcher::new(trigger, HeaderMap::new()))
        .await
        .unwrap();

    assert_eq!(report.dispatched(), 3);
    assert_eq!(report.succeeded(), 2);

    let failure = report
        .outcomes
        .iter()
        .find_map(|o| match o {
            DispatchOutcome::Failed(e) => Some(e),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure.display_name, "App B");
    assert!(matches!(failure.source, AppCenterError::RemoteApi { .. }));

    for app in ["App A", "App B", "App C"] {
        assert_eq!(logs.count(Level::INFO, &format!("Evaluating app {}", app)), 1);
    }
    assert_eq!(logs.count(Level::INFO, "Evaluating app"), 3);
    assert_eq!(logs.count(Level::INFO, "Success in sending build request"), 2);
    assert_eq!(logs.count(Level::INFO, "for app App A:"), 1);
    assert_eq!(logs.count(Level::INFO, "for app App C:"), 1);
    assert_eq!(logs.count_level(Level::WARN), 1);
    assert_eq!(logs.count(Level::WARN, "for app App B, skipping"), 1);
    assert_eq!(logs.count_level(Level::ERROR), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn listing_failure_aborts_before_any_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0.1/orgs/acme/apps"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let trigger = BuildTrigger::resolve(None, Some("refs/heads/main"), Some("abc123")).unwrap();
    let err = runner_for(&server)
        .run(BuildDispatcher::new(trigger, HeaderMap::new()))
        .await
        .unwrap_err();

    assert_eq!(err.organization, "acme");
    assert!(matches!(
        err.source,
        AppCenterError::InvalidResponse { status: 503, .. }
    ));

    assert_eq!(logs.count_level(Level::ERROR), 1);
    assert_eq!(logs.count(Level::ERROR, "Failure in getting apps, aborting"), 1);
    assert_eq!(logs.count(Level::INFO, "Evaluating app"), 0);
    assert_eq!(logs.count_level(Level::WARN), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn webhook_is_signed_with_each_apps_secret() {
    let server = MockServer::start().await;
    mount_roster(
        &server,
        json!([
            {"id": "X", "name": "x-app", "app_secret": "s"},
            {"id": "Y", "name": "y-app", "app_secret": "t"},
            {"id": "Z", "name": "z-app"}
        ]),
    )
    .await;

    let payload = json!({
        "ref": "refs/heads/main",
        "head_commit": {"id": "abc123", "message": "Ship it"},
        "after": "abc123"
    });

    for (id, secret) in [("X", "s"), ("Y", "t")] {
        let expected = format!("sha1={}", sign(&payload, secret).unwrap());
        Mock::given(method("POST"))
            .and(path(format!("/v0.1/public/apps/{}/hooks", id)))
            .and(header("X-Hub-Signature", expected.as_str()))
            .and(header("X-GitHub-Event", "push"))
            .and(header("host", "api.appcenter.ms"))
            .and(move |req: &Request| {
                req.headers
                    .get("X-Hub-Signature")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|sig| verify_signature(secret, &req.body, sig))
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"received": true})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/v0.1/public/apps/Z/hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let report = runner_for(&server)
        .run(WebhookDispatcher::new(payload, HeaderMap::new()))
        .await
        .unwrap();

    assert_eq!(report.dispatched(), 3);
    assert_eq!(report.succeeded(), 2);
    assert!(report.outcomes.iter().any(|o| matches!(
        o,
        DispatchOutcome::Failed(e)
            if e.display_name == "z-app"
                && matches!(e.source, AppCenterError::MissingField { field: "app_secret" })
    )));
}

#[tokio::test(flavor = "current_thread")]
async fn webhook_rejection_is_read_from_message() {
    let server = MockServer::start().await;
    mount_roster(&server, json!([{"id": "X", "app_secret": "s"}])).await;

    Mock::given(method("POST"))
        .and(path("/v0.1/public/apps/X/hooks"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid signature"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let report = runner_for(&server)
        .run(WebhookDispatcher::new(json!({"ref": "refs/heads/main"}), HeaderMap::new()))
        .await
        .unwrap();

    assert_eq!(report.dispatched(), 1);
    assert_eq!(report.failed(), 1);
}
