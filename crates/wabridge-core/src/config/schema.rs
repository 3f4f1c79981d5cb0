//! Configuration schema definitions.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::time::Duration;

/// Main wabridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Mapping storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bridge engine tuning.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Phone normalization.
    #[serde(default)]
    pub phone: PhoneConfig,

    /// Messaging session manager connection.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Per-session CRM bindings, keyed by messaging session id.
    #[serde(default)]
    pub sessions: HashMap<String, SessionConfig>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token protecting the admin endpoints.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_secret"
    )]
    pub auth_token: Option<SecretString>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            auth_token: None,
        }
    }
}

fn default_port() -> u16 {
    8088
}

/// Bind mode for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,
}

/// Mapping storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sqlx database URL, e.g. `sqlite:///var/lib/wabridge/bridge.db` or `sqlite::memory:`.
    /// Defaults to `~/.wabridge/bridge.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

/// Bridge engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Fixed delay before a CRM webhook is processed.
    ///
    /// Absorbs the interleaving of the CRM's own message-creation acknowledgment
    /// with webhook delivery. A mitigation, not a proven bound.
    #[serde(default = "default_webhook_delay_ms")]
    pub webhook_delay_ms: u64,

    /// Timeout applied to every external call (CRM, messaging, storage).
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Prefix of the source ids the bridge stamps on messages it posts to the CRM.
    #[serde(default = "default_echo_tag_prefix")]
    pub echo_tag_prefix: String,

    /// Pending mappings untouched for less than this are left alone by the retry sweep.
    ///
    /// Must exceed [`BridgeConfig::delivery_budget`], so a sweep never picks up
    /// a mapping whose first delivery is still running.
    #[serde(default = "default_retry_min_age_secs")]
    pub retry_min_age_secs: u64,

    /// Attempts for idempotent CRM lookups.
    #[serde(default = "default_resolve_retries")]
    pub resolve_retries: u32,

    /// Backoff step between lookup attempts.
    #[serde(default = "default_resolve_backoff_ms")]
    pub resolve_backoff_ms: u64,

    /// Mark the contact's bridged messages as read when an agent replies.
    #[serde(default = "default_true")]
    pub mark_read_on_reply: bool,

    /// Mappings older than this many days are removed by `cleanup` when no age is given.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            webhook_delay_ms: default_webhook_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            echo_tag_prefix: default_echo_tag_prefix(),
            retry_min_age_secs: default_retry_min_age_secs(),
            resolve_retries: default_resolve_retries(),
            resolve_backoff_ms: default_resolve_backoff_ms(),
            mark_read_on_reply: true,
            retention_days: default_retention_days(),
        }
    }
}

impl BridgeConfig {
    pub fn webhook_delay(&self) -> Duration {
        Duration::from_millis(self.webhook_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_min_age(&self) -> Duration {
        Duration::from_secs(self.retry_min_age_secs)
    }

    pub fn resolve_backoff(&self) -> Duration {
        Duration::from_millis(self.resolve_backoff_ms)
    }

    /// Longest one inbound delivery may run: contact and conversation
    /// find-or-create with every lookup retried, then the post and the store write.
    pub fn delivery_budget(&self) -> Duration {
        let lookups = u64::from(self.resolve_retries.max(1));
        // Contact: lookup, create, fallback lookup, rename. Conversation: lookup,
        // create, fallback lookup. Then post and mark synced.
        let calls = 4 * lookups + 5;
        let backoff_steps = 4 * lookups * (lookups - 1) / 2;
        self.call_timeout()
            .saturating_mul(u32::try_from(calls).unwrap_or(u32::MAX))
            .saturating_add(
                self.resolve_backoff()
                    .saturating_mul(u32::try_from(backoff_steps).unwrap_or(u32::MAX)),
            )
    }
}

fn default_webhook_delay_ms() -> u64 {
    500
}

fn default_call_timeout_secs() -> u64 {
    15
}

fn default_echo_tag_prefix() -> String {
    "WAID:".to_string()
}

fn default_retry_min_age_secs() -> u64 {
    300
}

fn default_resolve_retries() -> u32 {
    3
}

fn default_resolve_backoff_ms() -> u64 {
    250
}

fn default_retention_days() -> u32 {
    90
}

fn default_true() -> bool {
    true
}

/// Phone normalization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Country code prepended to national numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Shortest digit count treated as a national number.
    #[serde(default = "default_national_min_len")]
    pub national_min_len: usize,

    /// Longest digit count treated as a national number.
    #[serde(default = "default_national_max_len")]
    pub national_max_len: usize,

    /// Regional merge rules, by id, tried in order.
    #[serde(default = "default_regional_rules")]
    pub regional_rules: Vec<String>,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            national_min_len: default_national_min_len(),
            national_max_len: default_national_max_len(),
            regional_rules: default_regional_rules(),
        }
    }
}

fn default_country_code() -> String {
    "55".to_string()
}

fn default_national_min_len() -> usize {
    10
}

fn default_national_max_len() -> usize {
    11
}

fn default_regional_rules() -> Vec<String> {
    vec!["br-ninth-digit".to_string()]
}

/// Connection to the messaging session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Base URL of the session manager's HTTP API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Token sent to the session manager.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_secret"
    )]
    pub token: Option<SecretString>,

    /// HTTP timeout for session manager calls.
    #[serde(default = "default_messaging_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: default_messaging_timeout_secs(),
        }
    }
}

fn default_messaging_timeout_secs() -> u64 {
    30
}

/// CRM binding of one messaging session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Whether bridging is active for the session.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// CRM connection.
    pub crm: CrmConfig,

    /// Prefix outbound messages with the replying agent's name.
    #[serde(default)]
    pub sign_messages: bool,
}

/// CRM account and inbox a session is bridged into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// CRM base URL, e.g. `https://app.chatwoot.com`.
    pub base_url: String,

    /// Account id.
    pub account_id: u64,

    /// Inbox id conversations are created in.
    pub inbox_id: u64,

    /// API access token.
    #[serde(serialize_with = "serialize_secret")]
    pub api_token: SecretString,

    /// HTTP timeout for CRM calls.
    #[serde(default = "default_crm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_crm_timeout_secs() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn serialize_secret<S: Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

fn serialize_optional_secret<S: Serializer>(
    secret: &Option<SecretString>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => s.serialize_some(secret.expose_secret()),
        None => s.serialize_none(),
    }
}
