//! In-memory fakes for bridge tests.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wabridge_core::config::{CrmConfig, SessionConfig};
use wabridge_crm::{
    ContactIdentity, ConversationHandle, ConversationStatus, CrmClient, CrmError, NewContact,
    NewRemoteMessage,
};

use crate::messaging::{MessagingError, MessagingManager, OutboundNative, ReadResult, SendReceipt};
use crate::registry::CrmClientFactory;

pub fn session_config(inbox_id: u64) -> SessionConfig {
    SessionConfig {
        enabled: true,
        crm: CrmConfig {
            base_url: "http://crm.test".to_string(),
            account_id: 1,
            inbox_id,
            api_token: SecretString::new("token".to_string()),
            timeout_secs: 5,
        },
        sign_messages: false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrmCounts {
    pub find_contact: u32,
    pub create_contact: u32,
    pub create_conversation: u32,
    pub renamed: Vec<(u64, String)>,
    pub posted: Vec<(u64, NewRemoteMessage)>,
}

#[derive(Default)]
struct CrmState {
    contacts: Vec<ContactIdentity>,
    conversations: Vec<ConversationHandle>,
    next_id: u64,
    counts: CrmCounts,
    failing_lookups: u32,
    race_on_create: bool,
    reject_contact_creation: bool,
    fail_posts: bool,
}

impl CrmState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// CRM holding contacts and conversations in memory.
#[derive(Default)]
pub struct FakeCrm {
    state: Mutex<CrmState>,
    post_delay: Mutex<Option<Duration>>,
}

impl FakeCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> CrmCounts {
        self.state.lock().unwrap().counts.clone()
    }

    pub fn posted(&self) -> Vec<(u64, NewRemoteMessage)> {
        self.counts().posted
    }

    pub fn seed_contact(&self, phone_key: &str, name: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.contacts.push(ContactIdentity {
            phone_key: phone_key.to_string(),
            display_name: Some(name.to_string()),
            crm_contact_id: id,
        });
        id
    }

    /// The next `n` contact lookups fail with a server error.
    pub fn fail_lookups(&self, n: u32) {
        self.state.lock().unwrap().failing_lookups = n;
    }

    /// Contact creation inserts the contact but reports it as already existing.
    pub fn race_on_create(&self) {
        self.state.lock().unwrap().race_on_create = true;
    }

    pub fn reject_contact_creation(&self) {
        self.state.lock().unwrap().reject_contact_creation = true;
    }

    pub fn fail_posts(&self, fail: bool) {
        self.state.lock().unwrap().fail_posts = fail;
    }

    pub fn delay_posts(&self, delay: Duration) {
        *self.post_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl CrmClient for FakeCrm {
    async fn find_contact(&self, phone_key: &str, _inbox_id: u64) -> wabridge_crm::Result<Option<ContactIdentity>> {
        let mut state = self.state.lock().unwrap();
        state.counts.find_contact += 1;
        if state.failing_lookups > 0 {
            state.failing_lookups -= 1;
            return Err(CrmError::server_error(503, "unavailable"));
        }
        Ok(state.contacts.iter().find(|c| c.phone_key == phone_key).cloned())
    }

    async fn create_contact(&self, contact: NewContact) -> wabridge_crm::Result<ContactIdentity> {
        let mut state = self.state.lock().unwrap();
        state.counts.create_contact += 1;
        if state.reject_contact_creation {
            return Err(CrmError::invalid_request(400, "rejected"));
        }
        let id = state.next_id();
        let created = ContactIdentity {
            phone_key: contact.phone_key,
            display_name: Some(contact.name),
            crm_contact_id: id,
        };
        state.contacts.push(created.clone());
        if state.race_on_create {
            return Err(CrmError::AlreadyExists("phone_number has already been taken".to_string()));
        }
        Ok(created)
    }

    async fn update_contact_name(&self, contact_id: u64, name: &str) -> wabridge_crm::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.counts.renamed.push((contact_id, name.to_string()));
        if let Some(contact) = state.contacts.iter_mut().find(|c| c.crm_contact_id == contact_id) {
            contact.display_name = Some(name.to_string());
        }
        Ok(())
    }

    async fn find_conversation(
        &self,
        contact_id: u64,
        inbox_id: u64,
    ) -> wabridge_crm::Result<Option<ConversationHandle>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .find(|c| c.crm_contact_id == contact_id && c.crm_inbox_id == inbox_id)
            .cloned())
    }

    async fn create_conversation(
        &self,
        contact_id: u64,
        inbox_id: u64,
        _source_id: Option<&str>,
    ) -> wabridge_crm::Result<ConversationHandle> {
        let mut state = self.state.lock().unwrap();
        state.counts.create_conversation += 1;
        let id = state.next_id();
        let conversation = ConversationHandle {
            crm_conversation_id: id,
            crm_contact_id: contact_id,
            crm_inbox_id: inbox_id,
            status: ConversationStatus::Open,
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn post_message(&self, conversation_id: u64, message: NewRemoteMessage) -> wabridge_crm::Result<u64> {
        let delay = *self.post_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_posts {
            return Err(CrmError::server_error(502, "bad gateway"));
        }
        state.counts.posted.push((conversation_id, message));
        Ok(state.next_id())
    }
}

/// Factory handing every session the same [`FakeCrm`].
#[derive(Clone, Default)]
pub struct FakeCrmFactory {
    pub crm: Arc<FakeCrm>,
    created: Arc<AtomicUsize>,
}

impl FakeCrmFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl CrmClientFactory for FakeCrmFactory {
    fn create(&self, _session_id: &str, _config: &SessionConfig) -> Result<Arc<dyn CrmClient>, CrmError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.crm.clone())
    }
}

#[derive(Debug, Default)]
struct MessagingState {
    sent: Vec<(String, OutboundNative)>,
    read: Vec<(String, String, Vec<String>)>,
    revoked: Vec<(String, String, String)>,
    next_id: u64,
    fail_sends: bool,
}

/// Messaging manager recording every call.
#[derive(Debug, Default)]
pub struct FakeMessaging {
    state: Mutex<MessagingState>,
}

impl FakeMessaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, OutboundNative)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn read(&self) -> Vec<(String, String, Vec<String>)> {
        self.state.lock().unwrap().read.clone()
    }

    pub fn revoked(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().revoked.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }
}

#[async_trait]
impl MessagingManager for FakeMessaging {
    async fn send(&self, session_id: &str, message: OutboundNative) -> Result<SendReceipt, MessagingError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(MessagingError::Rejected {
                status: 503,
                message: "session offline".to_string(),
            });
        }
        state.next_id += 1;
        let native_message_id = format!("N{}", state.next_id);
        state.sent.push((session_id.to_string(), message));
        Ok(SendReceipt {
            native_message_id,
            timestamp: Utc::now(),
        })
    }

    async fn mark_read(&self, session_id: &str, phone: &str, native_message_ids: &[String]) -> Vec<ReadResult> {
        let mut state = self.state.lock().unwrap();
        state
            .read
            .push((session_id.to_string(), phone.to_string(), native_message_ids.to_vec()));
        native_message_ids.iter().map(ReadResult::ok).collect()
    }

    async fn revoke(&self, session_id: &str, phone: &str, native_message_id: &str) -> Result<(), MessagingError> {
        self.state.lock().unwrap().revoked.push((
            session_id.to_string(),
            phone.to_string(),
            native_message_id.to_string(),
        ));
        Ok(())
    }
}
