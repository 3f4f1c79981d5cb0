//! Bridge orchestration.
//!
//! [`BridgeEngine`] drives both directions:
//!
//! - **inbound** (messaging → CRM): gate on the mapping store, resolve the
//!   contact and conversation, post the message, record the outcome.
//! - **outbound** (CRM webhook → messaging): classify, send natively, and
//!   record a synced mapping for echo suppression.
//!
//! The store's duplicate rejection on `create_pending` gates first
//! deliveries; the retry sweep additionally claims each pending mapping
//! before re-posting it. No lock is held across an external call, every
//! external call runs under the configured call timeout, and a whole
//! delivery runs under the delivery budget.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wabridge_core::config::BridgeConfig;
use wabridge_core::id::{echo_tag, is_echo_tag, short_id};
use wabridge_core::{Config, ContentFormatter, Direction, InboundMessage, MessageKind, PhoneNormalizer};
use wabridge_crm::{
    ContactIdentity, ConversationHandle, ConversationStatus, CrmError, MessageType, NewRemoteMessage,
};
use wabridge_store::{MappingStats, MappingStatus, MappingStore, MessageMapping, NewMapping, RemoteIds};

use crate::classifier::{BridgeEvent, Decision, EventClassifier, SkipReason};
use crate::error::BridgeError;
use crate::identity::IdentityResolver;
use crate::messaging::{InboundHandler, MessagingManager, OutboundNative, ReadResult};
use crate::registry::{SessionContext, SessionRegistry};
use crate::Result;

/// Synced inbound messages considered when marking a conversation read.
const MARK_READ_WINDOW: usize = 20;

/// Result of handling a native message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InboundOutcome {
    /// Posted to the CRM and recorded.
    Synced {
        mapping_id: String,
        remote_message_id: String,
        remote_conversation_id: String,
    },
    /// A mapping already existed; nothing was done.
    AlreadyMapped,
    /// A concurrent attempt won the race for this message.
    Duplicate,
    /// Not bridged.
    Ignored { reason: SkipReason },
    /// Posted to the CRM, but the mapping could not be marked synced. It
    /// stays pending and a resync may duplicate the CRM message.
    DeliveredUnrecorded {
        mapping_id: String,
        remote_message_id: String,
        remote_conversation_id: String,
    },
}

/// Result of handling a CRM webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Skipped {
        reason: SkipReason,
    },
    StatusUpdated {
        conversation_id: u64,
        status: ConversationStatus,
    },
    Revoked {
        native_message_id: String,
    },
    Forwarded {
        native_message_id: String,
        /// Per-message results of marking the conversation read.
        read: Vec<ReadResult>,
    },
}

/// Outcome of a pending-mapping sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    /// Mappings attempted.
    pub processed: u64,
    /// Attempts that did not end synced.
    pub failed: u64,
    /// Mappings another sweep claimed first.
    pub skipped: u64,
}

impl RetryReport {
    pub fn synced(&self) -> u64 {
        self.processed - self.failed
    }
}

/// Reconciles a messaging session with its CRM inbox.
pub struct BridgeEngine {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn MappingStore>,
    messaging: Arc<dyn MessagingManager>,
    normalizer: PhoneNormalizer,
    formatter: ContentFormatter,
    classifier: EventClassifier,
    resolver: IdentityResolver,
    config: BridgeConfig,
    delivery_budget: Duration,
}

impl BridgeEngine {
    pub fn new(
        config: &Config,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn MappingStore>,
        messaging: Arc<dyn MessagingManager>,
    ) -> Result<Self> {
        let normalizer =
            PhoneNormalizer::from_config(&config.phone).map_err(|e| BridgeError::config(e.to_string()))?;

        Ok(Self {
            registry,
            store,
            messaging,
            normalizer,
            formatter: ContentFormatter::new(),
            classifier: EventClassifier::new(config.bridge.echo_tag_prefix.clone()),
            resolver: IdentityResolver::from_config(&config.bridge),
            delivery_budget: config.bridge.delivery_budget(),
            config: config.bridge.clone(),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    pub fn normalizer(&self) -> &PhoneNormalizer {
        &self.normalizer
    }

    async fn session(&self, session_id: &str) -> Result<Arc<SessionContext>> {
        self.registry
            .get(session_id)
            .await
            .ok_or_else(|| BridgeError::SessionNotFound(session_id.to_string()))
    }

    /// Await `fut` under the call timeout.
    async fn deadline<F: Future>(&self, operation: &'static str, fut: F) -> Result<F::Output> {
        let after = self.config.call_timeout();
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| BridgeError::Timeout { operation, after })
    }

    // -----------------------------------------------------------------------
    // Inbound: messaging -> CRM
    // -----------------------------------------------------------------------

    /// Bridge a native message into the CRM, at most once per
    /// `(session_id, native_message_id)`.
    pub async fn process_inbound(&self, message: InboundMessage) -> Result<InboundOutcome> {
        let session = self.session(&message.session_id).await?;
        let session_id = message.session_id.as_str();
        let native_message_id = message.native_message_id.as_str();

        if !session.is_enabled() {
            debug!(session_id, "Session disabled, ignoring inbound message");
            return Ok(InboundOutcome::Ignored {
                reason: SkipReason::SessionDisabled,
            });
        }

        if let Some(tag) = message.echo_tag.as_deref() {
            if is_echo_tag(&self.config.echo_tag_prefix, tag) {
                debug!(session_id, native_message_id, tag, "Ignoring echo of bridged message");
                return Ok(InboundOutcome::Ignored {
                    reason: SkipReason::Echo,
                });
            }
        }

        if self
            .deadline("is_mapped", self.store.is_mapped(session_id, native_message_id))
            .await??
        {
            debug!(session_id, native_message_id, "Message already mapped");
            return Ok(InboundOutcome::AlreadyMapped);
        }

        // Self-sent messages belong to the conversation with the recipient.
        let phone_key = message
            .counterpart_phone()
            .map(|phone| self.normalizer.canonical_key(phone))
            .unwrap_or_default();

        let new = NewMapping::new(session_id, native_message_id, Direction::Inbound, phone_key.clone())
            .with_payload(message.kind, message.content.clone())
            .with_display_name(message.display_name.clone())
            .from_self(message.is_from_self)
            .sent_at(message.timestamp)
            .with_phone_rules(self.normalizer.ruleset_fingerprint());

        let mapping = match self
            .deadline("create_pending", self.store.create_pending(new))
            .await?
        {
            Ok(mapping) => mapping,
            Err(e) if e.is_duplicate() => {
                debug!(session_id, native_message_id, "Concurrent attempt owns this message");
                return Ok(InboundOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        if phone_key.is_empty() {
            self.mark_failed(&mapping.id).await;
            return Err(BridgeError::identity(format!(
                "message {} has no counterpart phone",
                native_message_id
            )));
        }

        self.deliver_bounded(&session, &mapping).await
    }

    /// [`Self::deliver`] under the delivery budget. An overrun leaves the
    /// mapping pending; the sweep only takes mappings idle for longer.
    async fn deliver_bounded(&self, session: &SessionContext, mapping: &MessageMapping) -> Result<InboundOutcome> {
        let after = self.delivery_budget;
        match tokio::time::timeout(after, self.deliver(session, mapping)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    session_id = %mapping.session_id,
                    mapping_id = %mapping.id,
                    "Delivery exceeded {:?}, left pending", after
                );
                Err(BridgeError::Timeout {
                    operation: "deliver",
                    after,
                })
            }
        }
    }

    /// Post a pending mapping's payload to the CRM and settle its state.
    async fn deliver(&self, session: &SessionContext, mapping: &MessageMapping) -> Result<InboundOutcome> {
        let (_contact, conversation) = match self
            .resolve_identity(session, &mapping.counterpart_phone, mapping.display_name.as_deref())
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                warn!(
                    session_id = %mapping.session_id,
                    mapping_id = %mapping.id,
                    "Identity resolution failed: {}", e
                );
                self.mark_failed(&mapping.id).await;
                return Err(e);
            }
        };

        let content = self
            .formatter
            .format_for_remote(mapping.content.as_deref().unwrap_or_default(), mapping.kind);
        let message_type = if mapping.from_self {
            MessageType::Outgoing
        } else {
            MessageType::Incoming
        };
        let message = NewRemoteMessage::new(content, message_type)
            .with_source_id(echo_tag(&self.config.echo_tag_prefix, &mapping.native_message_id));
        let conversation_id = conversation.crm_conversation_id;

        let remote_message_id = match self
            .deadline("post_message", session.crm.post_message(conversation_id, message))
            .await
        {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                if matches!(e, CrmError::NotFound(_)) {
                    session.conversations.evict(&mapping.counterpart_phone).await;
                }
                warn!(mapping_id = %mapping.id, conversation_id, "Posting to CRM failed: {}", e);
                self.mark_failed(&mapping.id).await;
                return Err(BridgeError::transport(format!("post_message: {}", e)));
            }
            Err(e) => {
                // Unconfirmed: the post may have landed. Stays pending.
                warn!(mapping_id = %mapping.id, conversation_id, "{}", e);
                return Err(e);
            }
        };

        let remote = RemoteIds::new(remote_message_id.to_string(), conversation_id.to_string());
        let recorded = match self
            .deadline("mark_synced", self.store.mark_synced(&mapping.id, remote.clone()))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::from(e)),
            Err(e) => Err(e),
        };

        match recorded {
            Ok(()) => {
                info!(
                    session_id = %mapping.session_id,
                    native_message_id = %mapping.native_message_id,
                    mapping_id = %mapping.id,
                    remote_message_id,
                    conversation_id,
                    "Bridged inbound message"
                );
                Ok(InboundOutcome::Synced {
                    mapping_id: mapping.id.clone(),
                    remote_message_id: remote.message_id,
                    remote_conversation_id: remote.conversation_id,
                })
            }
            Err(e) => {
                error!(
                    session_id = %mapping.session_id,
                    native_message_id = %mapping.native_message_id,
                    mapping_id = %mapping.id,
                    remote_message_id,
                    conversation_id,
                    "Message posted to CRM but mapping not recorded; a resync may duplicate it: {}",
                    e
                );
                Ok(InboundOutcome::DeliveredUnrecorded {
                    mapping_id: mapping.id.clone(),
                    remote_message_id: remote.message_id,
                    remote_conversation_id: remote.conversation_id,
                })
            }
        }
    }

    /// Contact and conversation for a phone key, from the session cache when
    /// fresh and the observed name still matches.
    async fn resolve_identity(
        &self,
        session: &SessionContext,
        phone_key: &str,
        display_name: Option<&str>,
    ) -> Result<(ContactIdentity, ConversationHandle)> {
        if let Some((contact, conversation)) = session.conversations.get(phone_key).await {
            let name_matches = display_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| contact.display_name.as_deref() == Some(name))
                .unwrap_or(true);
            if name_matches {
                return Ok((contact, conversation));
            }
        }

        let crm = session.crm.as_ref();
        let contact = self
            .resolver
            .resolve_contact(crm, phone_key, display_name, session.inbox_id())
            .await?;
        let conversation = self
            .resolver
            .resolve_conversation(crm, &contact, session.inbox_id())
            .await?;

        session
            .conversations
            .insert(phone_key, contact.clone(), conversation.clone())
            .await;
        Ok((contact, conversation))
    }

    async fn mark_failed(&self, mapping_id: &str) {
        match self
            .deadline("mark_failed", self.store.mark_failed(mapping_id))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(mapping_id, "Failed to mark mapping failed: {}", e),
            Err(e) => error!(mapping_id, "Failed to mark mapping failed: {}", e),
        }
    }

    // -----------------------------------------------------------------------
    // Outbound: CRM webhook -> messaging
    // -----------------------------------------------------------------------

    /// Handle a raw webhook body. Undecodable bodies are skipped, not errors.
    pub async fn process_outbound_webhook_bytes(&self, session_id: &str, raw: &[u8]) -> Result<WebhookOutcome> {
        match serde_json::from_slice::<Value>(raw) {
            Ok(payload) => self.process_outbound_webhook(session_id, &payload).await,
            Err(e) => {
                self.session(session_id).await?;
                warn!(session_id, "Skipping undecodable webhook: {}", e);
                Ok(WebhookOutcome::Skipped {
                    reason: SkipReason::Malformed,
                })
            }
        }
    }

    /// Handle a CRM webhook.
    pub async fn process_outbound_webhook(&self, session_id: &str, payload: &Value) -> Result<WebhookOutcome> {
        let session = self.session(session_id).await?;
        if !session.is_enabled() {
            return Ok(WebhookOutcome::Skipped {
                reason: SkipReason::SessionDisabled,
            });
        }

        // The CRM can fire the webhook before its own write to the
        // conversation settles. The delay narrows that window; it does not
        // close it.
        let delay = self.config.webhook_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let event = match self.classifier.classify(payload) {
            Ok(event) => event,
            Err(BridgeError::MalformedPayload(reason)) => {
                warn!(session_id, "Skipping malformed webhook: {}", reason);
                return Ok(WebhookOutcome::Skipped {
                    reason: SkipReason::Malformed,
                });
            }
            Err(e) => return Err(e),
        };

        match event.decision {
            Decision::Skip(reason) => {
                debug!(session_id, event = %event.event, %reason, "Skipping webhook");
                Ok(WebhookOutcome::Skipped { reason })
            }
            Decision::StatusChange => self.apply_status(&session, &event).await,
            Decision::Deletion => self.revoke(&session, &event).await,
            Decision::Forward => self.forward(&session, event).await,
        }
    }

    async fn apply_status(&self, session: &SessionContext, event: &BridgeEvent) -> Result<WebhookOutcome> {
        let (Some(conversation_id), Some(status)) = (event.conversation_id, event.conversation_status) else {
            warn!(session_id = %session.session_id, "Status change without conversation status");
            return Ok(WebhookOutcome::Skipped {
                reason: SkipReason::Malformed,
            });
        };

        let cached = session.conversations.apply_status(conversation_id, status).await;
        debug!(
            session_id = %session.session_id,
            conversation_id,
            status = status.as_str(),
            cached,
            "Conversation status changed"
        );
        Ok(WebhookOutcome::StatusUpdated {
            conversation_id,
            status,
        })
    }

    async fn revoke(&self, session: &SessionContext, event: &BridgeEvent) -> Result<WebhookOutcome> {
        let session_id = session.session_id.as_str();
        let Some(remote_message_id) = event.remote_message_id else {
            return Ok(WebhookOutcome::Skipped {
                reason: SkipReason::Malformed,
            });
        };

        let mapping = self
            .deadline(
                "find_by_remote_message",
                self.store
                    .find_by_remote_message(session_id, &remote_message_id.to_string()),
            )
            .await??;

        let Some(mapping) = mapping.filter(|m| m.direction == Direction::Outbound) else {
            debug!(session_id, remote_message_id, "Deleted message has no native counterpart");
            return Ok(WebhookOutcome::Skipped {
                reason: SkipReason::Unmapped,
            });
        };

        self.deadline(
            "revoke",
            self.messaging
                .revoke(session_id, &mapping.counterpart_phone, &mapping.native_message_id),
        )
        .await?
        .map_err(|e| BridgeError::transport(format!("revoke: {}", e)))?;

        info!(
            session_id,
            native_message_id = %mapping.native_message_id,
            remote_message_id,
            "Revoked native message"
        );
        Ok(WebhookOutcome::Revoked {
            native_message_id: mapping.native_message_id,
        })
    }

    async fn forward(&self, session: &SessionContext, event: BridgeEvent) -> Result<WebhookOutcome> {
        let session_id = session.session_id.as_str();

        let phone_key = event
            .contact_phone
            .as_deref()
            .map(|phone| self.normalizer.canonical_key(phone))
            .unwrap_or_default();
        if phone_key.is_empty() {
            return Err(BridgeError::Unaddressable(format!(
                "conversation {:?} carries no contact phone",
                event.conversation_id
            )));
        }

        let mut body = self.formatter.format_for_native(&event.content);
        if session.config.sign_messages {
            if let Some(agent) = event.sender_name.as_deref() {
                body = self.formatter.sign(&body, agent);
            }
        }

        let (kind, media_url) = match &event.attachment {
            Some(attachment) => (
                MessageKind::from_file_type(&attachment.file_type),
                Some(attachment.data_url.clone()),
            ),
            None => (MessageKind::Text, None),
        };

        let tag_id = event
            .remote_message_id
            .map(|id| id.to_string())
            .unwrap_or_else(short_id);
        let outbound = OutboundNative {
            phone: phone_key.clone(),
            kind,
            body,
            media_url,
            echo_tag: echo_tag(&self.config.echo_tag_prefix, &tag_id),
        };

        let receipt = self
            .deadline("send", self.messaging.send(session_id, outbound))
            .await?
            .map_err(|e| BridgeError::transport(format!("send: {}", e)))?;

        info!(
            session_id,
            native_message_id = %receipt.native_message_id,
            remote_message_id = ?event.remote_message_id,
            "Forwarded CRM message"
        );

        if let (Some(remote_id), Some(conversation_id)) = (event.remote_message_id, event.conversation_id) {
            let new = NewMapping::new(
                session_id,
                receipt.native_message_id.clone(),
                Direction::Outbound,
                phone_key.clone(),
            )
            .with_payload(kind, event.content.clone())
            .from_self(true);
            let remote = RemoteIds::new(remote_id.to_string(), conversation_id.to_string());

            match self
                .deadline("record_synced", self.store.record_synced(new, remote))
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(session_id, "Failed to record outbound mapping: {}", e),
                Err(e) => warn!(session_id, "Failed to record outbound mapping: {}", e),
            }
        }

        let read = match event.conversation_id {
            Some(conversation_id) if self.config.mark_read_on_reply => {
                self.mark_conversation_read(session_id, conversation_id, &phone_key)
                    .await
            }
            _ => Vec::new(),
        };

        Ok(WebhookOutcome::Forwarded {
            native_message_id: receipt.native_message_id,
            read,
        })
    }

    /// Mark the contact's recent bridged messages read after an agent reply.
    async fn mark_conversation_read(&self, session_id: &str, conversation_id: u64, phone: &str) -> Vec<ReadResult> {
        let recent = match self
            .deadline(
                "list_synced_inbound_for_conversation",
                self.store.list_synced_inbound_for_conversation(
                    session_id,
                    &conversation_id.to_string(),
                    MARK_READ_WINDOW,
                ),
            )
            .await
        {
            Ok(Ok(mappings)) => mappings,
            Ok(Err(e)) => {
                warn!(session_id, conversation_id, "Cannot list messages to mark read: {}", e);
                return Vec::new();
            }
            Err(e) => {
                warn!(session_id, conversation_id, "Cannot list messages to mark read: {}", e);
                return Vec::new();
            }
        };

        let ids: Vec<String> = recent
            .into_iter()
            .filter(|m| !m.from_self)
            .map(|m| m.native_message_id)
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        // Items are bounded one by one inside the manager.
        let results = self.messaging.mark_read(session_id, phone, &ids).await;
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        if failed > 0 {
            warn!(session_id, conversation_id, failed, "Some messages were not marked read");
        }
        results
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Mapping counts for a session.
    pub async fn mapping_stats(&self, session_id: &str) -> Result<MappingStats> {
        Ok(self
            .deadline("stats", self.store.stats(session_id))
            .await??)
    }

    /// Re-deliver inbound mappings left pending for at least the retry grace age.
    ///
    /// Each mapping is claimed in the store before it is posted, so
    /// overlapping sweeps deliver it once. Only mappings never confirmed
    /// synced are considered; failed mappings stay failed.
    pub async fn retry_pending(&self, session_id: &str, limit: usize) -> Result<RetryReport> {
        let session = self.session(session_id).await?;
        let pending = self
            .deadline(
                "list_pending",
                self.store
                    .list_pending(session_id, limit, self.config.retry_min_age()),
            )
            .await??;

        let mut report = RetryReport::default();
        for mapping in pending
            .into_iter()
            .filter(|m| m.direction == Direction::Inbound)
        {
            let claimed = self
                .deadline(
                    "claim_pending",
                    self.store.claim_pending(&mapping.id, mapping.updated_at),
                )
                .await??;
            if !claimed {
                debug!(session_id, mapping_id = %mapping.id, "Mapping claimed by another sweep");
                report.skipped += 1;
                continue;
            }
            report.processed += 1;

            if mapping.content.is_none() || mapping.counterpart_phone.is_empty() {
                warn!(session_id, mapping_id = %mapping.id, "Pending mapping cannot be replayed");
                self.mark_failed(&mapping.id).await;
                report.failed += 1;
                continue;
            }

            match self.deliver_bounded(&session, &mapping).await {
                Ok(InboundOutcome::Synced { .. }) => {}
                Ok(_) => report.failed += 1,
                Err(e) => {
                    warn!(session_id, mapping_id = %mapping.id, "Retry failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            session_id,
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "Pending sweep finished"
        );
        Ok(report)
    }

    /// Failed mappings of a session, most recent first.
    pub async fn failed_mappings(&self, session_id: &str, limit: usize) -> Result<Vec<MessageMapping>> {
        Ok(self
            .deadline("list_failed", self.store.list_failed(session_id, limit))
            .await??)
    }

    /// Deliver a failed inbound mapping again, as a new pending mapping.
    ///
    /// The failed row is kept for the record. Returns
    /// [`InboundOutcome::Duplicate`] when the message already has a live mapping.
    pub async fn resync_failed(&self, session_id: &str, mapping_id: &str) -> Result<InboundOutcome> {
        let session = self.session(session_id).await?;
        let failed = self
            .deadline("get", self.store.get(mapping_id))
            .await??
            .filter(|m| m.session_id == session_id)
            .ok_or_else(|| BridgeError::MappingNotFound(mapping_id.to_string()))?;

        if failed.status != MappingStatus::Failed || failed.direction != Direction::Inbound {
            return Err(BridgeError::config(format!(
                "mapping {} is {} {}; only failed inbound mappings can be resynced",
                mapping_id, failed.direction, failed.status
            )));
        }
        if failed.content.is_none() || failed.counterpart_phone.is_empty() {
            return Err(BridgeError::config(format!(
                "mapping {} has no stored payload to replay",
                mapping_id
            )));
        }

        let mapping = match self
            .deadline("create_pending", self.store.create_pending(NewMapping::replay_of(&failed)))
            .await?
        {
            Ok(mapping) => mapping,
            Err(e) if e.is_duplicate() => {
                debug!(session_id, mapping_id, "Message already has a live mapping");
                return Ok(InboundOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            session_id,
            failed_mapping_id = mapping_id,
            mapping_id = %mapping.id,
            native_message_id = %mapping.native_message_id,
            "Resyncing failed mapping"
        );
        self.deliver_bounded(&session, &mapping).await
    }

    /// Delete mappings older than `days`. Irreversible.
    pub async fn cleanup_older_than(&self, session_id: &str, days: u32) -> Result<u64> {
        if days == 0 {
            return Err(BridgeError::config("retention must be at least one day"));
        }
        let age = Duration::from_secs(u64::from(days) * 24 * 60 * 60);
        let deleted = self
            .deadline("delete_older_than", self.store.delete_older_than(session_id, age))
            .await??;
        info!(session_id, days, deleted, "Deleted old mappings");
        Ok(deleted)
    }
}

#[async_trait]
impl InboundHandler for BridgeEngine {
    async fn on_inbound_message(&self, message: InboundMessage) -> Result<InboundOutcome> {
        self.process_inbound(message).await
    }
}

impl std::fmt::Debug for BridgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
