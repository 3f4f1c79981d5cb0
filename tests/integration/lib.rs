//! Shared harness for the end-to-end tests.
//!
//! Stands up a wiremock CRM and a wiremock session manager, wires a real
//! engine over an in-memory SQLite store, and exposes the gateway router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wabridge_bridge::{BridgeEngine, HttpMessagingManager, SessionRegistry};
use wabridge_core::config::{ConfigBuilder, CrmConfig, SessionConfig};
use wabridge_core::Config;
use wabridge_gateway::Gateway;
use wabridge_store::SqliteMappingStore;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request as MockRequest, ResponseTemplate};

pub const SESSION: &str = "main";
pub const ACCOUNT: u64 = 1;
pub const INBOX: u64 = 7;
pub const ADMIN_TOKEN: &str = "admin-secret";

pub struct Harness {
    pub crm: MockServer,
    pub sidecar: MockServer,
    pub engine: Arc<BridgeEngine>,
    pub router: Router,
}

pub fn session_config(crm_url: &str) -> SessionConfig {
    SessionConfig {
        enabled: true,
        crm: CrmConfig {
            base_url: crm_url.to_string(),
            account_id: ACCOUNT,
            inbox_id: INBOX,
            api_token: secrecy::SecretString::new("crm-token".to_string()),
            timeout_secs: 5,
        },
        sign_messages: false,
    }
}

pub fn crm_path(rest: &str) -> String {
    format!("/api/v1/accounts/{}/{}", ACCOUNT, rest)
}

impl Harness {
    pub async fn start() -> Self {
        let crm = MockServer::start().await;
        let sidecar = MockServer::start().await;

        let mut config: Config = ConfigBuilder::new()
            .auth_token(ADMIN_TOKEN)
            .webhook_delay_ms(0)
            .messaging_url(sidecar.uri())
            .build();
        config.sessions.insert(SESSION.to_string(), session_config(&crm.uri()));

        let store = SqliteMappingStore::open("sqlite::memory:").await.unwrap();
        let registry = SessionRegistry::chatwoot();
        registry.load_from_config(&config).await.unwrap();
        let messaging = HttpMessagingManager::from_config(&config.messaging).unwrap();

        let engine = Arc::new(
            BridgeEngine::new(&config, Arc::new(registry), Arc::new(store), Arc::new(messaging)).unwrap(),
        );
        let router = Gateway::new(&config, engine.clone()).router();

        Self {
            crm,
            sidecar,
            engine,
            router,
        }
    }

    /// CRM with no contacts: search misses, creation succeeds.
    pub async fn mount_empty_crm(&self, contact_id: u64, conversation_id: u64, message_id: u64) {
        Mock::given(method("GET"))
            .and(path(crm_path("contacts/search")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": []})))
            .mount(&self.crm)
            .await;
        Mock::given(method("POST"))
            .and(path(crm_path("contacts")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": {"contact": {"id": contact_id, "name": "Joao"}}
            })))
            .mount(&self.crm)
            .await;
        Mock::given(method("GET"))
            .and(path(crm_path(&format!("contacts/{}/conversations", contact_id))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": []})))
            .mount(&self.crm)
            .await;
        Mock::given(method("POST"))
            .and(path(crm_path("conversations")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": conversation_id, "inbox_id": INBOX, "status": "open"
            })))
            .mount(&self.crm)
            .await;
        Mock::given(method("POST"))
            .and(path(crm_path(&format!("conversations/{}/messages", conversation_id))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": message_id})))
            .mount(&self.crm)
            .await;
    }

    /// Session manager accepting sends, reads and revokes.
    pub async fn mount_sidecar(&self, native_id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/sessions/{}/messages", SESSION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": native_id})))
            .mount(&self.sidecar)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(format!(r"^/sessions/{}/messages/[^/]+/read$", SESSION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&self.sidecar)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(format!(r"^/sessions/{}/messages/[^/]+$", SESSION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&self.sidecar)
            .await;
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.call(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap();
        self.call(request).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

/// Requests `server` received matching `method` and a path suffix.
pub async fn received(server: &MockServer, http_method: &str, path_suffix: &str) -> Vec<MockRequest> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.to_string() == http_method && r.url.path().ends_with(path_suffix))
        .collect()
}

/// Poll until `server` has received a matching request; webhooks are processed in the background.
pub async fn wait_for(server: &MockServer, http_method: &str, path_suffix: &str) -> Vec<MockRequest> {
    for _ in 0..100 {
        let found = received(server, http_method, path_suffix).await;
        if !found.is_empty() {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no {} request ending in {} arrived", http_method, path_suffix);
}
