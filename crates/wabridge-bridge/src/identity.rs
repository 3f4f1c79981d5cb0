//! Contact and conversation resolution against the CRM.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wabridge_core::config::BridgeConfig;
use wabridge_crm::{ContactIdentity, ConversationHandle, CrmClient, CrmError, NewContact};

use crate::error::BridgeError;

/// Identity resolution failure.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The CRM refused or could not produce the identity. Fatal for the message.
    #[error("{0}")]
    Unresolvable(String),

    /// Network failure or timeout; a later attempt may succeed.
    #[error("{0}")]
    Transient(String),
}

impl IdentityError {
    fn from_crm(operation: &str, err: CrmError) -> Self {
        if err.is_transient() {
            Self::Transient(format!("{}: {}", operation, err))
        } else {
            Self::Unresolvable(format!("{}: {}", operation, err))
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<IdentityError> for BridgeError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unresolvable(msg) => BridgeError::IdentityUnresolvable(msg),
            IdentityError::Transient(msg) => BridgeError::TransportFailure(msg),
        }
    }
}

/// Finds or creates CRM contacts and conversations for a phone key.
///
/// Lookups are idempotent and retried on transient failures with linear
/// backoff. Creations are attempted once; "already exists" falls back to a
/// lookup.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    retries: u32,
    backoff: Duration,
    call_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(retries: u32, backoff: Duration, call_timeout: Duration) -> Self {
        Self {
            retries: retries.max(1),
            backoff,
            call_timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.resolve_retries, config.resolve_backoff(), config.call_timeout())
    }

    /// Resolve the contact for `phone_key`, creating it on a miss.
    ///
    /// A differing `display_name` renames the existing contact; a failed
    /// rename is logged and the contact is still returned.
    pub async fn resolve_contact(
        &self,
        crm: &dyn CrmClient,
        phone_key: &str,
        display_name: Option<&str>,
        inbox_id: u64,
    ) -> Result<ContactIdentity, IdentityError> {
        if phone_key.is_empty() {
            return Err(IdentityError::Unresolvable("empty phone key".to_string()));
        }
        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());

        let found = self
            .lookup("find_contact", || crm.find_contact(phone_key, inbox_id))
            .await?;

        let contact = match found {
            Some(contact) => contact,
            None => {
                let new = NewContact {
                    inbox_id,
                    phone_key: phone_key.to_string(),
                    name: display_name.unwrap_or(phone_key).to_string(),
                };
                match self.once("create_contact", crm.create_contact(new)).await? {
                    Ok(contact) => {
                        info!(phone_key, contact_id = contact.crm_contact_id, "Created CRM contact");
                        return Ok(contact);
                    }
                    Err(CrmError::AlreadyExists(_)) => {
                        debug!(phone_key, "Contact created concurrently, looking it up");
                        self.lookup("find_contact", || crm.find_contact(phone_key, inbox_id))
                            .await?
                            .ok_or_else(|| {
                                IdentityError::Unresolvable(format!(
                                    "contact for {} reported as existing but not found",
                                    phone_key
                                ))
                            })?
                    }
                    Err(e) => return Err(IdentityError::from_crm("create_contact", e)),
                }
            }
        };

        match display_name {
            Some(name) if contact.display_name.as_deref() != Some(name) => {
                self.rename(crm, contact, name).await
            }
            _ => Ok(contact),
        }
    }

    async fn rename(
        &self,
        crm: &dyn CrmClient,
        mut contact: ContactIdentity,
        name: &str,
    ) -> Result<ContactIdentity, IdentityError> {
        match self
            .once("update_contact_name", crm.update_contact_name(contact.crm_contact_id, name))
            .await
        {
            Ok(Ok(())) => {
                debug!(contact_id = contact.crm_contact_id, name, "Renamed CRM contact");
                contact.display_name = Some(name.to_string());
            }
            Ok(Err(e)) => {
                warn!(contact_id = contact.crm_contact_id, "Failed to rename contact: {}", e);
            }
            Err(e) => {
                warn!(contact_id = contact.crm_contact_id, "Failed to rename contact: {}", e);
            }
        }
        Ok(contact)
    }

    /// Resolve the contact's conversation in `inbox_id`, creating it on a miss.
    pub async fn resolve_conversation(
        &self,
        crm: &dyn CrmClient,
        contact: &ContactIdentity,
        inbox_id: u64,
    ) -> Result<ConversationHandle, IdentityError> {
        let contact_id = contact.crm_contact_id;

        if let Some(conversation) = self
            .lookup("find_conversation", || crm.find_conversation(contact_id, inbox_id))
            .await?
        {
            return Ok(conversation);
        }

        let created = self
            .once(
                "create_conversation",
                crm.create_conversation(contact_id, inbox_id, Some(contact.phone_key.as_str())),
            )
            .await?;

        match created {
            Ok(conversation) => {
                info!(
                    contact_id,
                    conversation_id = conversation.crm_conversation_id,
                    "Created CRM conversation"
                );
                Ok(conversation)
            }
            Err(CrmError::AlreadyExists(_)) => self
                .lookup("find_conversation", || crm.find_conversation(contact_id, inbox_id))
                .await?
                .ok_or_else(|| {
                    IdentityError::Unresolvable(format!(
                        "conversation for contact {} reported as existing but not found",
                        contact_id
                    ))
                }),
            Err(e) => Err(IdentityError::from_crm("create_conversation", e)),
        }
    }

    /// Run an idempotent call, retrying transient failures.
    async fn lookup<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, IdentityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = wabridge_crm::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.once(operation, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => IdentityError::from_crm(operation, e),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.retries {
                return Err(err);
            }

            warn!(operation, attempt, "Transient CRM failure, retrying: {}", err);
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }

    /// Run a call once under the call timeout. The outer error is the timeout.
    async fn once<T, Fut>(
        &self,
        operation: &'static str,
        call: Fut,
    ) -> Result<wabridge_crm::Result<T>, IdentityError>
    where
        Fut: Future<Output = wabridge_crm::Result<T>>,
    {
        tokio::time::timeout(self.call_timeout, call).await.map_err(|_| {
            IdentityError::Transient(format!("{} timed out after {:?}", operation, self.call_timeout))
        })
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}
