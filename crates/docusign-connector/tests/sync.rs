use std::sync::Mutex;

use docusign_connector::{
    AuthContext, ConnectorConfig, HostLogger, HostSink, HttpClient, Orchestrator, Row, SyncState,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str, oauth_base_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        integration_key: "ik-123".into(),
        user_id: "user-1".into(),
        oauth_base_url: oauth_base_url.into(),
        base_url: base_url.into(),
        account_id: "acct-1".into(),
        private_key: Some(TEST_RSA_KEY.into()),
        private_key_path: None,
    }
}

// A 2048-bit RSA private key generated solely for this test fixture.
const TEST_RSA_KEY: &str = include_str!("fixtures/test_private_key.pem");

#[derive(Default)]
struct RecordingSink {
    upserts: Mutex<Vec<(String, Row)>>,
    checkpoints: Mutex<Vec<SyncState>>,
}

impl HostSink for RecordingSink {
    fn upsert(&self, table: &str, row: Row) {
        self.upserts.lock().unwrap().push((table.to_string(), row));
    }

    fn checkpoint(&self, state: &SyncState) {
        self.checkpoints.lock().unwrap().push(state.clone());
    }
}

struct RecordingLogger {
    warnings: Mutex<Vec<String>>,
}

impl Default for RecordingLogger {
    fn default() -> Self {
        Self {
            warnings: Mutex::new(Vec::new()),
        }
    }
}

impl HostLogger for RecordingLogger {
    fn info(&self, _message: &str) {}

    fn warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn severe(&self, _message: &str) {}
}

async fn mount_oauth_success(oauth_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "tok-abc123"})),
        )
        .mount(oauth_server)
        .await;
}

async fn mount_empty_child_resources(api_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/templates"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"envelopeTemplates": []})),
        )
        .mount(api_server)
        .await;
}

fn build_orchestrator(api_server: &MockServer, oauth_server: &MockServer) -> Orchestrator {
    let config = test_config(&api_server.uri(), &oauth_server.uri());
    let http = reqwest::Client::new();
    let auth = AuthContext::new(config, TEST_RSA_KEY.to_string(), http.clone());
    let client = HttpClient::new(http, auth.clone());
    Orchestrator::new(client, auth)
}

#[tokio::test]
async fn empty_account_still_fetches_templates_and_checkpoints() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/envelopes"))
        .and(query_param("start_position", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"envelopes": []})),
        )
        .mount(&api_server)
        .await;
    mount_empty_child_resources(&api_server).await;

    let orchestrator = build_orchestrator(&api_server, &oauth_server);
    let sink = RecordingSink::default();
    let logger = RecordingLogger::default();

    orchestrator
        .run(&SyncState::default(), &sink, &logger)
        .await
        .expect("sync succeeds");

    assert!(sink.upserts.lock().unwrap().is_empty());
    assert_eq!(sink.checkpoints.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn single_completed_envelope_derives_cycle_time() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/envelopes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "envelopes": [{
                "envelopeId": "E1",
                "status": "completed",
                "sentDateTime": "2024-01-01T00:00:00Z",
                "completedDateTime": "2024-01-02T12:00:00Z",
            }]
        })))
        .mount(&api_server)
        .await;

    for child in [
        "recipients",
        "audit_events",
        "notification",
        "documents",
        "tabs",
        "custom_fields",
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/v2.1/accounts/acct-1/envelopes/E1/{child}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&api_server)
            .await;
    }
    mount_empty_child_resources(&api_server).await;

    let orchestrator = build_orchestrator(&api_server, &oauth_server);
    let sink = RecordingSink::default();
    let logger = RecordingLogger::default();

    orchestrator
        .run(&SyncState::default(), &sink, &logger)
        .await
        .expect("sync succeeds");

    let upserts = sink.upserts.lock().unwrap();
    let (_, envelope_row) = upserts
        .iter()
        .find(|(table, _)| table == "envelope")
        .expect("envelope row emitted");
    assert_eq!(envelope_row.get("contract_cycle_time_hours"), Some("36.0"));
    assert_eq!(envelope_row.get("conversion_status"), Some("completed"));
}

#[tokio::test]
async fn document_download_failure_emits_document_without_content() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/envelopes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "envelopes": [{"envelopeId": "E1", "status": "sent"}]
        })))
        .mount(&api_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/envelopes/E1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "envelopeDocuments": [{"documentId": "D1", "name": "contract.pdf"}]
        })))
        .mount(&api_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/envelopes/E1/documents/D1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&api_server)
        .await;

    for child in [
        "recipients",
        "audit_events",
        "notification",
        "tabs",
        "custom_fields",
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/v2.1/accounts/acct-1/envelopes/E1/{child}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&api_server)
            .await;
    }
    mount_empty_child_resources(&api_server).await;

    let orchestrator = build_orchestrator(&api_server, &oauth_server);
    let sink = RecordingSink::default();
    let logger = RecordingLogger::default();

    orchestrator
        .run(&SyncState::default(), &sink, &logger)
        .await
        .expect("sync succeeds despite the failed document download");

    let upserts = sink.upserts.lock().unwrap();
    assert!(upserts.iter().any(|(table, _)| table == "document"));
    assert!(!upserts.iter().any(|(table, _)| table == "document_content"));
    assert!(
        logger
            .warnings
            .lock()
            .unwrap()
            .iter()
            .any(|w| w.contains("document content download failed"))
    );
}

#[tokio::test]
async fn token_expiry_mid_sync_aborts_without_checkpoint() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/envelopes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&api_server)
        .await;

    let orchestrator = build_orchestrator(&api_server, &oauth_server);
    let sink = RecordingSink::default();
    let logger = RecordingLogger::default();

    let result = orchestrator
        .run(&SyncState::default(), &sink, &logger)
        .await;

    assert!(result.is_err());
    assert!(sink.checkpoints.lock().unwrap().is_empty());
}

fn build_http_client(api_server: &MockServer, oauth_server: &MockServer) -> HttpClient {
    let config = test_config(&api_server.uri(), &oauth_server.uri());
    let http = reqwest::Client::new();
    let auth = AuthContext::new(config, TEST_RSA_KEY.to_string(), http.clone());
    HttpClient::new(http, auth)
}

#[tokio::test]
async fn rate_limit_then_success_retries_and_returns_the_eventual_body() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/widgets"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&api_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&api_server)
        .await;

    let client = build_http_client(&api_server, &oauth_server);
    let url = format!("{}/v2.1/accounts/acct-1/widgets", api_server.uri());

    let started = std::time::Instant::now();
    let body: serde_json::Value = client
        .get_json(&url, &[])
        .await
        .expect("eventually succeeds");
    let elapsed = started.elapsed();

    assert_eq!(body, serde_json::json!({"ok": true}));
    assert_eq!(api_server.received_requests().await.unwrap().len(), 3);
    assert!(
        elapsed >= std::time::Duration::from_secs(3),
        "expected at least 3s of backoff (1s + 2s), got {elapsed:?}"
    );
}

#[tokio::test]
async fn server_errors_exhaust_retries_and_raise() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/widgets"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&api_server)
        .await;

    let client = build_http_client(&api_server, &oauth_server);
    let url = format!("{}/v2.1/accounts/acct-1/widgets", api_server.uri());

    let result = client.get_json::<serde_json::Value>(&url, &[]).await;

    assert!(result.is_err());
    assert_eq!(api_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn unauthorized_fails_fast_without_retrying() {
    let api_server = MockServer::start().await;
    let oauth_server = MockServer::start().await;
    mount_oauth_success(&oauth_server).await;

    Mock::given(method("GET"))
        .and(path("/v2.1/accounts/acct-1/widgets"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&api_server)
        .await;

    let client = build_http_client(&api_server, &oauth_server);
    let url = format!("{}/v2.1/accounts/acct-1/widgets", api_server.uri());

    let result = client.get_json::<serde_json::Value>(&url, &[]).await;

    assert!(matches!(
        result,
        Err(docusign_connector::ConnectorError::AuthFailed(_))
    ));
    assert_eq!(api_server.received_requests().await.unwrap().len(), 1);
}
