//! Per-session contexts.
//!
//! Each messaging session is bound to one CRM account and inbox. The
//! registry owns a [`SessionContext`] per session holding the CRM client and
//! a short-lived conversation cache. Replacing a session's config replaces
//! the whole context, which drops the old client and cache with it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use wabridge_core::config::SessionConfig;
use wabridge_core::Config;
use wabridge_crm::{
    ChatwootClient, ContactIdentity, ConversationHandle, ConversationStatus, CrmClient, CrmError,
};

use crate::error::BridgeError;
use crate::Result;

/// Default lifetime of a cached conversation.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Builds CRM clients for sessions.
pub trait CrmClientFactory: Send + Sync {
    fn create(
        &self,
        session_id: &str,
        config: &SessionConfig,
    ) -> std::result::Result<Arc<dyn CrmClient>, CrmError>;
}

/// Factory producing [`ChatwootClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatwootFactory;

impl CrmClientFactory for ChatwootFactory {
    fn create(
        &self,
        _session_id: &str,
        config: &SessionConfig,
    ) -> std::result::Result<Arc<dyn CrmClient>, CrmError> {
        Ok(Arc::new(ChatwootClient::from_config(&config.crm)?))
    }
}

#[derive(Debug, Clone)]
struct CachedIdentity {
    contact: ContactIdentity,
    conversation: ConversationHandle,
    cached_at: Instant,
}

/// Resolved contact and conversation per phone key.
#[derive(Debug)]
pub struct ConversationCache {
    entries: RwLock<HashMap<String, CachedIdentity>>,
    ttl: Duration,
}

impl ConversationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached identity for `phone_key`, if fresh.
    pub async fn get(&self, phone_key: &str) -> Option<(ContactIdentity, ConversationHandle)> {
        let entries = self.entries.read().await;
        entries
            .get(phone_key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| (entry.contact.clone(), entry.conversation.clone()))
    }

    /// Cache an identity. Expired entries are dropped first so the map only
    /// holds phone keys seen within the TTL.
    pub async fn insert(&self, phone_key: &str, contact: ContactIdentity, conversation: ConversationHandle) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        entries.insert(
            phone_key.to_string(),
            CachedIdentity {
                contact,
                conversation,
                cached_at: Instant::now(),
            },
        );
    }

    /// Apply a CRM status change. Resolved conversations are evicted so the
    /// next message re-resolves. Returns whether any entry was affected.
    pub async fn apply_status(&self, conversation_id: u64, status: ConversationStatus) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        if !status.is_active() {
            entries.retain(|_, entry| entry.conversation.crm_conversation_id != conversation_id);
            return entries.len() != before;
        }

        let mut touched = false;
        for entry in entries.values_mut() {
            if entry.conversation.crm_conversation_id == conversation_id {
                entry.conversation.status = status;
                touched = true;
            }
        }
        touched
    }

    pub async fn evict(&self, phone_key: &str) -> bool {
        self.entries.write().await.remove(phone_key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Everything needed to bridge one session.
pub struct SessionContext {
    pub session_id: String,
    pub config: SessionConfig,
    pub crm: Arc<dyn CrmClient>,
    pub conversations: ConversationCache,
}

impl SessionContext {
    pub fn inbox_id(&self) -> u64 {
        self.config.crm.inbox_id
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("inbox_id", &self.inbox_id())
            .field("enabled", &self.config.enabled)
            .finish()
    }
}

/// Registry of session contexts.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
    factory: Arc<dyn CrmClientFactory>,
    cache_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn CrmClientFactory>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Registry creating Chatwoot clients.
    pub fn chatwoot() -> Self {
        Self::new(Arc::new(ChatwootFactory))
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn build(&self, session_id: &str, config: SessionConfig) -> Result<Arc<SessionContext>> {
        let crm = self.factory.create(session_id, &config).map_err(|e| {
            BridgeError::config(format!("session '{}': cannot create CRM client: {}", session_id, e))
        })?;

        Ok(Arc::new(SessionContext {
            session_id: session_id.to_string(),
            config,
            crm,
            conversations: ConversationCache::new(self.cache_ttl),
        }))
    }

    /// Register a session, replacing any existing context.
    pub async fn register(&self, session_id: &str, config: SessionConfig) -> Result<Arc<SessionContext>> {
        let context = self.build(session_id, config)?;
        let previous = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), context.clone());

        if previous.is_some() {
            info!(session_id, "Replaced session context");
        } else {
            info!(session_id, inbox_id = context.inbox_id(), "Registered session");
        }
        Ok(context)
    }

    /// Replace the config of a registered session.
    ///
    /// Tasks already holding the old context finish with it; new lookups get
    /// a fresh client and an empty conversation cache.
    pub async fn update(&self, session_id: &str, config: SessionConfig) -> Result<Arc<SessionContext>> {
        if !self.sessions.read().await.contains_key(session_id) {
            return Err(BridgeError::SessionNotFound(session_id.to_string()));
        }
        self.register(session_id, config).await
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id, "Removed session");
        }
        removed
    }

    /// Registered session ids, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register every session in `config`. Returns how many were registered.
    pub async fn load_from_config(&self, config: &Config) -> Result<usize> {
        let mut ids: Vec<&String> = config.sessions.keys().collect();
        ids.sort();

        for id in &ids {
            self.register(id, config.sessions[*id].clone()).await?;
        }
        Ok(ids.len())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}
