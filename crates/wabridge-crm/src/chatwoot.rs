//! Chatwoot application API client.

use crate::types::phone_digits;
use crate::{
    ContactIdentity, ConversationHandle, ConversationStatus, CrmClient, CrmError, NewContact,
    NewRemoteMessage, Result,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use wabridge_core::config::CrmConfig;

/// Client for one Chatwoot account.
pub struct ChatwootClient {
    /// HTTP client.
    client: Client,

    /// Base URL without trailing slash.
    base_url: String,

    /// Account id.
    account_id: u64,

    /// API access token.
    api_token: SecretString,
}

impl ChatwootClient {
    /// Create a client with a 30 second request timeout.
    pub fn new(base_url: impl Into<String>, account_id: u64, api_token: impl Into<String>) -> Result<Self> {
        Self::build(
            base_url.into(),
            account_id,
            SecretString::new(api_token.into()),
            Duration::from_secs(30),
        )
    }

    /// Create a client from a session's CRM configuration.
    pub fn from_config(config: &CrmConfig) -> Result<Self> {
        Self::build(
            config.base_url.clone(),
            config.account_id,
            config.api_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn build(base_url: String, account_id: u64, api_token: SecretString, timeout: Duration) -> Result<Self> {
        if api_token.expose_secret().is_empty() {
            return Err(CrmError::config("API token is required"));
        }
        url::Url::parse(&base_url)
            .map_err(|e| CrmError::config(format!("Invalid base URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrmError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id,
            api_token,
        })
    }

    /// Account id this client is bound to.
    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/api/v1/accounts/{}/{}", self.base_url, self.account_id, path);
        self.client
            .request(method, url)
            .header("api_access_token", self.api_token.expose_secret())
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, body, retry_after));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| CrmError::Decode(e.to_string()))
    }
}

fn error_for_status(status: StatusCode, body: String, retry_after: Option<u64>) -> CrmError {
    let message = error_message(&body);
    match status.as_u16() {
        401 | 403 => CrmError::Authentication(message),
        404 => CrmError::NotFound(message),
        422 if is_taken(&message) => CrmError::AlreadyExists(message),
        429 => CrmError::RateLimit { retry_after },
        code if code >= 500 => CrmError::server_error(code, message),
        code => CrmError::invalid_request(code, message),
    }
}

/// Chatwoot reports errors as `{"message": ...}` or `{"error": ...}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

fn is_taken(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("taken") || message.contains("already")
}

#[derive(Debug, Deserialize)]
struct Payload<T> {
    payload: T,
}

#[derive(Debug, Deserialize)]
struct ContactDto {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreatedContact {
    Wrapped { contact: ContactDto },
    Bare(ContactDto),
}

#[derive(Debug, Deserialize)]
struct ConversationDto {
    id: u64,
    #[serde(default)]
    inbox_id: Option<u64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: u64,
}

impl ConversationDto {
    fn into_handle(self, contact_id: u64, inbox_id: u64) -> ConversationHandle {
        ConversationHandle {
            crm_conversation_id: self.id,
            crm_contact_id: contact_id,
            crm_inbox_id: self.inbox_id.unwrap_or(inbox_id),
            status: self
                .status
                .as_deref()
                .and_then(ConversationStatus::parse)
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl CrmClient for ChatwootClient {
    async fn find_contact(&self, phone_key: &str, _inbox_id: u64) -> Result<Option<ContactIdentity>> {
        // Contacts are account-wide in Chatwoot; the inbox does not narrow the search.
        let digits = phone_digits(phone_key);
        debug!("Searching CRM contact: phone={}", digits);

        let found: Payload<Vec<ContactDto>> = match self
            .send(
                self.request(Method::GET, "contacts/search")
                    .query(&[("q", digits.as_str())]),
            )
            .await
        {
            Ok(found) => found,
            Err(CrmError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(found
            .payload
            .into_iter()
            .find(|c| c.phone_number.as_deref().map(phone_digits).as_deref() == Some(digits.as_str()))
            .map(|c| ContactIdentity {
                phone_key: digits.clone(),
                display_name: c.name,
                crm_contact_id: c.id,
            }))
    }

    async fn create_contact(&self, contact: NewContact) -> Result<ContactIdentity> {
        let digits = phone_digits(&contact.phone_key);
        let name = if contact.name.trim().is_empty() {
            digits.clone()
        } else {
            contact.name
        };
        debug!("Creating CRM contact: phone={}", digits);

        let created: Payload<CreatedContact> = self
            .send(self.request(Method::POST, "contacts").json(&json!({
                "inbox_id": contact.inbox_id,
                "name": name,
                "phone_number": format!("+{}", digits),
            })))
            .await?;

        let dto = match created.payload {
            CreatedContact::Wrapped { contact } | CreatedContact::Bare(contact) => contact,
        };
        Ok(ContactIdentity {
            phone_key: digits,
            display_name: dto.name.or(Some(name)),
            crm_contact_id: dto.id,
        })
    }

    async fn update_contact_name(&self, contact_id: u64, name: &str) -> Result<()> {
        debug!("Renaming CRM contact {}", contact_id);
        let _: serde_json::Value = self
            .send(
                self.request(Method::PUT, &format!("contacts/{}", contact_id))
                    .json(&json!({ "name": name })),
            )
            .await?;
        Ok(())
    }

    async fn find_conversation(
        &self,
        contact_id: u64,
        inbox_id: u64,
    ) -> Result<Option<ConversationHandle>> {
        let listed: Payload<Vec<ConversationDto>> = match self
            .send(self.request(Method::GET, &format!("contacts/{}/conversations", contact_id)))
            .await
        {
            Ok(listed) => listed,
            Err(CrmError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut in_inbox: Vec<ConversationHandle> = listed
            .payload
            .into_iter()
            .filter(|c| c.inbox_id.map_or(true, |id| id == inbox_id))
            .map(|c| c.into_handle(contact_id, inbox_id))
            .collect();
        in_inbox.sort_by(|a, b| b.crm_conversation_id.cmp(&a.crm_conversation_id));

        let active = in_inbox.iter().position(|c| c.status.is_active());
        Ok(match active {
            Some(idx) => Some(in_inbox.swap_remove(idx)),
            None => in_inbox.into_iter().next(),
        })
    }

    async fn create_conversation(
        &self,
        contact_id: u64,
        inbox_id: u64,
        source_id: Option<&str>,
    ) -> Result<ConversationHandle> {
        debug!("Creating CRM conversation: contact={} inbox={}", contact_id, inbox_id);

        let mut body = json!({
            "contact_id": contact_id,
            "inbox_id": inbox_id,
            "status": "open",
        });
        if let Some(source_id) = source_id {
            body["source_id"] = json!(source_id);
        }

        let created: ConversationDto = self
            .send(self.request(Method::POST, "conversations").json(&body))
            .await?;
        Ok(created.into_handle(contact_id, inbox_id))
    }

    async fn post_message(&self, conversation_id: u64, message: NewRemoteMessage) -> Result<u64> {
        debug!("Posting CRM message: conversation={}", conversation_id);
        let posted: MessageDto = self
            .send(
                self.request(
                    Method::POST,
                    &format!("conversations/{}/messages", conversation_id),
                )
                .json(&message),
            )
            .await?;
        Ok(posted.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatwootClient {
        ChatwootClient::new(server.uri(), 1, "tok").unwrap()
    }

    #[test]
    fn test_client_requires_token() {
        assert!(matches!(
            ChatwootClient::new("https://crm.local", 1, ""),
            Err(CrmError::Config(_))
        ));
        assert!(ChatwootClient::new("not a url", 1, "tok").is_err());
    }

    #[tokio::test]
    async fn test_find_contact_matches_digits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/contacts/search"))
            .and(query_param("q", "5511987654321"))
            .and(header("api_access_token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [
                    {"id": 3, "name": "Other", "phone_number": "+55119876543210"},
                    {"id": 9, "name": "Ana", "phone_number": "+5511987654321"}
                ]
            })))
            .mount(&server)
            .await;

        let contact = client(&server)
            .find_contact("5511987654321", 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.crm_contact_id, 9);
        assert_eq!(contact.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_find_contact_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": []})))
            .mount(&server)
            .await;

        assert!(client(&server).find_contact("5511987654321", 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_contact_wrapped_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/1/contacts"))
            .and(body_partial_json(json!({"phone_number": "+5511987654321", "inbox_id": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": {"contact": {"id": 12, "name": "Ana"}, "contact_inbox": {"source_id": "x"}}
            })))
            .mount(&server)
            .await;

        let contact = client(&server)
            .create_contact(NewContact {
                inbox_id: 7,
                phone_key: "5511987654321".to_string(),
                name: "Ana".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(contact.crm_contact_id, 12);
    }

    #[tokio::test]
    async fn test_create_contact_taken_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/1/contacts"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({"message": "Phone number has already been taken"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .create_contact(NewContact {
                inbox_id: 7,
                phone_key: "5511987654321".to_string(),
                name: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_find_conversation_prefers_active_in_inbox() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/contacts/9/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [
                    {"id": 40, "inbox_id": 7, "status": "resolved"},
                    {"id": 31, "inbox_id": 7, "status": "open"},
                    {"id": 50, "inbox_id": 8, "status": "open"}
                ]
            })))
            .mount(&server)
            .await;

        let conversation = client(&server).find_conversation(9, 7).await.unwrap().unwrap();
        assert_eq!(conversation.crm_conversation_id, 31);
        assert_eq!(conversation.crm_inbox_id, 7);
        assert_eq!(conversation.status, ConversationStatus::Open);
    }

    #[tokio::test]
    async fn test_find_conversation_falls_back_to_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/contacts/9/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [{"id": 40, "inbox_id": 7, "status": "resolved"}]
            })))
            .mount(&server)
            .await;

        let conversation = client(&server).find_conversation(9, 7).await.unwrap().unwrap();
        assert_eq!(conversation.crm_conversation_id, 40);
    }

    #[tokio::test]
    async fn test_create_conversation_and_post_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/1/conversations"))
            .and(body_partial_json(json!({"contact_id": 9, "inbox_id": 7})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 77, "inbox_id": 7, "status": "open"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/1/conversations/77/messages"))
            .and(body_partial_json(json!({
                "content": "hello",
                "message_type": "incoming",
                "source_id": "WAID:M1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1001})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let conversation = client.create_conversation(9, 7, None).await.unwrap();
        assert_eq!(conversation.crm_conversation_id, 77);

        let id = client
            .post_message(
                77,
                NewRemoteMessage::new("hello", MessageType::Incoming).with_source_id("WAID:M1"),
            )
            .await
            .unwrap();
        assert_eq!(id, 1001);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/accounts/1/contacts/1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "bad token"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/accounts/1/contacts/2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.update_contact_name(1, "x").await.unwrap_err();
        assert!(matches!(err, CrmError::Authentication(ref m) if m == "bad token"));
        assert!(!err.is_transient());

        let err = client.update_contact_name(2, "x").await.unwrap_err();
        assert!(err.is_transient());
    }
}
