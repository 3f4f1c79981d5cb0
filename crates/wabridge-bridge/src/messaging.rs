//! Messaging session manager contract.
//!
//! The session manager owns the native transport. The bridge sends through
//! [`MessagingManager`] and receives through [`InboundHandler`], which the
//! engine implements and the gateway invokes for every native event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use wabridge_core::config::MessagingConfig;
use wabridge_core::{InboundMessage, MessageKind};

use crate::engine::InboundOutcome;

/// Errors returned by a messaging session manager.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The session manager refused the request.
    #[error("Rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Manager not configured.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MessagingError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A message to deliver on the native side.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundNative {
    /// Recipient canonical phone key.
    pub phone: String,
    pub kind: MessageKind,
    /// Body or caption.
    pub body: String,
    /// Media location for non-text kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Marker identifying the message as bridge-originated.
    pub echo_tag: String,
}

/// Confirmation of a native send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(alias = "id")]
    pub native_message_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Outcome of marking one native message as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    pub native_message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadResult {
    pub fn ok(native_message_id: impl Into<String>) -> Self {
        Self {
            native_message_id: native_message_id.into(),
            error: None,
        }
    }

    pub fn failed(native_message_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            native_message_id: native_message_id.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Operations the bridge needs from the messaging session manager.
#[async_trait]
pub trait MessagingManager: Send + Sync {
    /// Send a message on a session.
    async fn send(
        &self,
        session_id: &str,
        message: OutboundNative,
    ) -> Result<SendReceipt, MessagingError>;

    /// Mark messages from `phone` as read. Best effort: one result per id.
    ///
    /// Implementations bound each item on its own, so a slow item fails alone
    /// and earlier results stand.
    async fn mark_read(&self, session_id: &str, phone: &str, native_message_ids: &[String]) -> Vec<ReadResult>;

    /// Revoke (delete for everyone) a message the session sent.
    async fn revoke(
        &self,
        session_id: &str,
        phone: &str,
        native_message_id: &str,
    ) -> Result<(), MessagingError>;
}

/// Receiver of native inbound messages.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle a message observed on the native side.
    async fn on_inbound_message(&self, message: InboundMessage) -> crate::Result<InboundOutcome>;
}

/// Session manager reached over HTTP.
///
/// Routes, relative to the base URL (path segments percent-encoded):
/// - `POST /sessions/{session}/messages` sends
/// - `POST /sessions/{session}/messages/{id}/read` marks one message read
/// - `DELETE /sessions/{session}/messages/{id}` revokes
///
/// Every request, including each item of a bulk read, runs under the client timeout.
pub struct HttpMessagingManager {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for HttpMessagingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMessagingManager")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct PhoneBody<'a> {
    phone: &'a str,
}

impl HttpMessagingManager {
    /// Create a manager client for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MessagingError> {
        let base_url: String = base_url.into();
        let parsed = Url::parse(&base_url)
            .map_err(|e| MessagingError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(MessagingError::Config(format!(
                "Base URL '{}' cannot carry a path",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessagingError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: parsed,
            token: None,
        })
    }

    /// Create from the `messaging` config section.
    pub fn from_config(config: &MessagingConfig) -> Result<Self, MessagingError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| MessagingError::Config("messaging.base_url is not set".to_string()))?;
        let mut manager = Self::new(base_url, Duration::from_secs(config.timeout_secs))?;
        manager.token = config.token.clone();
        Ok(manager)
    }

    /// Authenticate with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into()));
        self
    }

    /// `{base}/sessions/{session_id}/{segments...}`, each segment encoded.
    fn url(&self, session_id: &str, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("sessions")
                .push(session_id)
                .extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, MessagingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(MessagingError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessagingManager for HttpMessagingManager {
    async fn send(
        &self,
        session_id: &str,
        message: OutboundNative,
    ) -> Result<SendReceipt, MessagingError> {
        debug!(session_id, kind = %message.kind, "Sending native message");

        let response = self
            .authorize(self.client.post(self.url(session_id, &["messages"])))
            .json(&message)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| MessagingError::Decode(e.to_string()))
    }

    async fn mark_read(&self, session_id: &str, phone: &str, native_message_ids: &[String]) -> Vec<ReadResult> {
        let mut results = Vec::with_capacity(native_message_ids.len());
        for id in native_message_ids {
            let request = self
                .authorize(
                    self.client
                        .post(self.url(session_id, &["messages", id.as_str(), "read"])),
                )
                .json(&PhoneBody { phone });

            let outcome = match request.send().await {
                Ok(response) => Self::check(response).await.map(|_| ()),
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok(()) => results.push(ReadResult::ok(id)),
                Err(e) => {
                    warn!(session_id, native_message_id = %id, "Failed to mark message read: {}", e);
                    results.push(ReadResult::failed(id, e.to_string()));
                }
            }
        }
        results
    }

    async fn revoke(
        &self,
        session_id: &str,
        phone: &str,
        native_message_id: &str,
    ) -> Result<(), MessagingError> {
        debug!(session_id, native_message_id, "Revoking native message");
        let response = self
            .authorize(
                self.client
                    .delete(self.url(session_id, &["messages", native_message_id])),
            )
            .json(&PhoneBody { phone })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn outbound() -> OutboundNative {
        OutboundNative {
            phone: "5511987654321".to_string(),
            kind: MessageKind::Text,
            body: "*hi*".to_string(),
            media_url: None,
            echo_tag: "WAID:55".to_string(),
        }
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let config = MessagingConfig::default();
        assert!(matches!(
            HttpMessagingManager::from_config(&config),
            Err(MessagingError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages"))
            .and(header("authorization", "Bearer sidecar"))
            .and(body_partial_json(json!({
                "phone": "5511987654321",
                "kind": "text",
                "echo_tag": "WAID:55"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "N1"})))
            .mount(&server)
            .await;

        let manager = HttpMessagingManager::new(server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_token("sidecar");
        let receipt = manager.send("s1", outbound()).await.unwrap();
        assert_eq!(receipt.native_message_id, "N1");
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages"))
            .respond_with(ResponseTemplate::new(503).set_body_string("session offline"))
            .mount(&server)
            .await;

        let manager = HttpMessagingManager::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = manager.send("s1", outbound()).await.unwrap_err();
        assert!(matches!(err, MessagingError::Rejected { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_mark_read_reports_per_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages/A/read"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages/B/read"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages/C/read"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let manager = HttpMessagingManager::new(server.uri(), Duration::from_secs(5)).unwrap();
        let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let results = manager.mark_read("s1", "5511987654321", &ids).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_mark_read_slow_item_fails_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages/A/read"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages/B/read"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/s1/messages/C/read"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let manager = HttpMessagingManager::new(server.uri(), Duration::from_millis(100)).unwrap();
        let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let results = manager.mark_read("s1", "5511987654321", &ids).await;

        assert_eq!(results[0], ReadResult::ok("A"));
        assert!(!results[1].is_ok());
        assert_eq!(results[2], ReadResult::ok("C"));
    }

    #[tokio::test]
    async fn test_path_segments_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sessions/main%20line/messages/3EB0%2FAB%3F/read"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/api/", server.uri());
        let manager = HttpMessagingManager::new(base, Duration::from_secs(5)).unwrap();
        let results = manager
            .mark_read("main line", "5511987654321", &["3EB0/AB?".to_string()])
            .await;
        assert!(results[0].is_ok(), "{:?}", results);
    }

    #[test]
    fn test_rejects_base_without_path() {
        assert!(matches!(
            HttpMessagingManager::new("mailto:ops@example.com", Duration::from_secs(1)),
            Err(MessagingError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/s1/messages/N1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let manager = HttpMessagingManager::new(server.uri(), Duration::from_secs(5)).unwrap();
        manager.revoke("s1", "5511987654321", "N1").await.unwrap();
    }
}
