//! Mapping store trait and in-memory implementation.

use crate::model::{MappingStats, MappingStatus, MessageMapping, NewMapping, RemoteIds};
use crate::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use wabridge_core::Direction;

/// Persistent table of bridge correlations.
///
/// At most one `pending` or `synced` mapping exists per `(session_id, native_message_id)`;
/// `create_pending` enforces this and is the only concurrency control the bridge relies on.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Whether any mapping exists for the key.
    async fn is_mapped(&self, session_id: &str, native_message_id: &str) -> Result<bool>;

    /// Insert a `pending` mapping, or fail with [`StoreError::Duplicate`].
    async fn create_pending(&self, new: NewMapping) -> Result<MessageMapping>;

    /// Insert a mapping that is already `synced`.
    async fn record_synced(&self, new: NewMapping, remote: RemoteIds) -> Result<MessageMapping>;

    /// Transition `pending -> synced`.
    async fn mark_synced(&self, mapping_id: &str, remote: RemoteIds) -> Result<()>;

    /// Transition `pending -> failed`.
    async fn mark_failed(&self, mapping_id: &str) -> Result<()>;

    /// Get a mapping by ID.
    async fn get(&self, mapping_id: &str) -> Result<Option<MessageMapping>>;

    /// Find the mapping correlated with a CRM message.
    async fn find_by_remote_message(
        &self,
        session_id: &str,
        remote_message_id: &str,
    ) -> Result<Option<MessageMapping>>;

    /// Pending mappings not created or claimed within `min_age`, oldest first.
    async fn list_pending(
        &self,
        session_id: &str,
        limit: usize,
        min_age: Duration,
    ) -> Result<Vec<MessageMapping>>;

    /// Failed mappings, most recently failed first.
    async fn list_failed(&self, session_id: &str, limit: usize) -> Result<Vec<MessageMapping>>;

    /// Take a listed pending mapping for redelivery.
    ///
    /// Succeeds only while the mapping is still pending and unchanged since
    /// it was read (`updated_at` equal to `seen_updated_at`), and then moves
    /// `updated_at` forward. Returns `false` when another caller got there first.
    async fn claim_pending(&self, mapping_id: &str, seen_updated_at: DateTime<Utc>) -> Result<bool>;

    /// Synced inbound mappings of a CRM conversation, newest first.
    async fn list_synced_inbound_for_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageMapping>>;

    /// Counts by status.
    async fn stats(&self, session_id: &str) -> Result<MappingStats>;

    /// Delete mappings at least `age` old. Irreversible.
    async fn delete_older_than(&self, session_id: &str, age: Duration) -> Result<u64>;
}

/// The instant `age` before now, saturating at the earliest representable time.
pub(crate) fn cutoff(age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The `updated_at` a claim writes: now, but always past the value it replaces.
pub(crate) fn claim_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + chrono::Duration::milliseconds(1))
}

/// In-memory mapping store.
pub struct MemoryMappingStore {
    mappings: RwLock<HashMap<String, MessageMapping>>,
}

impl Default for MemoryMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMappingStore {
    /// Create a new in-memory mapping store.
    pub fn new() -> Self {
        Self {
            mappings: RwLock::new(HashMap::new()),
        }
    }

    /// Number of mappings across all sessions.
    pub async fn len(&self) -> usize {
        self.mappings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mappings.read().await.is_empty()
    }

    async fn insert(&self, mapping: MessageMapping) -> Result<MessageMapping> {
        let mut mappings = self.mappings.write().await;
        let taken = mappings.values().any(|m| {
            m.session_id == mapping.session_id
                && m.native_message_id == mapping.native_message_id
                && m.status.is_live()
        });
        if taken {
            return Err(StoreError::duplicate(
                &mapping.session_id,
                &mapping.native_message_id,
            ));
        }
        mappings.insert(mapping.id.clone(), mapping.clone());
        Ok(mapping)
    }

    async fn transition(
        &self,
        mapping_id: &str,
        to: MappingStatus,
        remote: Option<RemoteIds>,
    ) -> Result<()> {
        let mut mappings = self.mappings.write().await;
        let mapping = mappings
            .get_mut(mapping_id)
            .ok_or_else(|| StoreError::NotFound(mapping_id.to_string()))?;

        if mapping.status != MappingStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id: mapping_id.to_string(),
                from: mapping.status,
                to,
            });
        }

        mapping.status = to;
        if let Some(remote) = remote {
            mapping.remote_message_id = Some(remote.message_id);
            mapping.remote_conversation_id = Some(remote.conversation_id);
        }
        mapping.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn is_mapped(&self, session_id: &str, native_message_id: &str) -> Result<bool> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .values()
            .any(|m| m.session_id == session_id && m.native_message_id == native_message_id))
    }

    async fn create_pending(&self, new: NewMapping) -> Result<MessageMapping> {
        self.insert(MessageMapping::from_new(new, MappingStatus::Pending))
            .await
    }

    async fn record_synced(&self, new: NewMapping, remote: RemoteIds) -> Result<MessageMapping> {
        let mut mapping = MessageMapping::from_new(new, MappingStatus::Synced);
        mapping.remote_message_id = Some(remote.message_id);
        mapping.remote_conversation_id = Some(remote.conversation_id);
        self.insert(mapping).await
    }

    async fn mark_synced(&self, mapping_id: &str, remote: RemoteIds) -> Result<()> {
        self.transition(mapping_id, MappingStatus::Synced, Some(remote))
            .await
    }

    async fn mark_failed(&self, mapping_id: &str) -> Result<()> {
        self.transition(mapping_id, MappingStatus::Failed, None).await
    }

    async fn get(&self, mapping_id: &str) -> Result<Option<MessageMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings.get(mapping_id).cloned())
    }

    async fn find_by_remote_message(
        &self,
        session_id: &str,
        remote_message_id: &str,
    ) -> Result<Option<MessageMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .values()
            .find(|m| {
                m.session_id == session_id
                    && m.remote_message_id.as_deref() == Some(remote_message_id)
            })
            .cloned())
    }

    async fn list_pending(
        &self,
        session_id: &str,
        limit: usize,
        min_age: Duration,
    ) -> Result<Vec<MessageMapping>> {
        let cutoff = cutoff(min_age);
        let mappings = self.mappings.read().await;
        let mut pending: Vec<MessageMapping> = mappings
            .values()
            .filter(|m| {
                m.session_id == session_id
                    && m.status == MappingStatus::Pending
                    && m.created_at <= cutoff
                    && m.updated_at <= cutoff
            })
            .cloned()
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_failed(&self, session_id: &str, limit: usize) -> Result<Vec<MessageMapping>> {
        let mappings = self.mappings.read().await;
        let mut failed: Vec<MessageMapping> = mappings
            .values()
            .filter(|m| m.session_id == session_id && m.status == MappingStatus::Failed)
            .cloned()
            .collect();

        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn claim_pending(&self, mapping_id: &str, seen_updated_at: DateTime<Utc>) -> Result<bool> {
        let mut mappings = self.mappings.write().await;
        let mapping = mappings
            .get_mut(mapping_id)
            .ok_or_else(|| StoreError::NotFound(mapping_id.to_string()))?;

        if mapping.status != MappingStatus::Pending || mapping.updated_at != seen_updated_at {
            return Ok(false);
        }
        mapping.updated_at = claim_stamp(mapping.updated_at);
        Ok(true)
    }

    async fn list_synced_inbound_for_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageMapping>> {
        let mappings = self.mappings.read().await;
        let mut synced: Vec<MessageMapping> = mappings
            .values()
            .filter(|m| {
                m.session_id == session_id
                    && m.direction == Direction::Inbound
                    && m.status == MappingStatus::Synced
                    && m.remote_conversation_id.as_deref() == Some(conversation_id)
            })
            .cloned()
            .collect();

        synced.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        synced.truncate(limit);
        Ok(synced)
    }

    async fn stats(&self, session_id: &str) -> Result<MappingStats> {
        let mappings = self.mappings.read().await;
        let mut stats = MappingStats::default();
        for mapping in mappings.values().filter(|m| m.session_id == session_id) {
            stats.add(mapping.status, 1);
        }
        Ok(stats)
    }

    async fn delete_older_than(&self, session_id: &str, age: Duration) -> Result<u64> {
        let cutoff = cutoff(age);
        let mut mappings = self.mappings.write().await;
        let before = mappings.len();
        mappings.retain(|_, m| !(m.session_id == session_id && m.created_at <= cutoff));
        Ok((before - mappings.len()) as u64)
    }
}
