//! Configuration loading and persistence.

use super::{BindMode, Config, CrmConfig, LogLevel, SessionConfig};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use crate::phone::rule_by_id;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Path of the config file: `WABRIDGE_CONFIG` when set, the default path otherwise.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        match env::get_var(env::vars::WABRIDGE_CONFIG) {
            Some(path) => Ok(PathBuf::from(path)),
            None => paths::config_file(),
        }
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// A copy with every credential replaced, for display.
    pub fn redacted(&self) -> Self {
        let mask = || SecretString::new("********".to_string());
        let mut config = self.clone();
        if config.gateway.auth_token.is_some() {
            config.gateway.auth_token = Some(mask());
        }
        if config.messaging.token.is_some() {
            config.messaging.token = Some(mask());
        }
        for session in config.sessions.values_mut() {
            session.crm.api_token = mask();
        }
        config
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }

        if self.bridge.call_timeout_secs == 0 {
            errors.push("Bridge call_timeout_secs must be greater than 0".to_string());
        }
        if self.bridge.echo_tag_prefix.trim().is_empty() {
            errors.push("Bridge echo_tag_prefix must not be empty".to_string());
        }
        if self.bridge.resolve_retries == 0 {
            errors.push("Bridge resolve_retries must be at least 1".to_string());
        }
        if self.bridge.retry_min_age() <= self.bridge.delivery_budget() {
            errors.push(format!(
                "Bridge retry_min_age_secs ({}) must exceed the delivery budget of {}s",
                self.bridge.retry_min_age_secs,
                self.bridge.delivery_budget().as_secs()
            ));
        }

        if !self.phone.default_country_code.chars().any(|c| c.is_ascii_digit()) {
            errors.push(format!(
                "Phone default_country_code '{}' contains no digits",
                self.phone.default_country_code
            ));
        }
        if self
            .phone
            .default_country_code
            .chars()
            .find(|c| c.is_ascii_digit())
            == Some('0')
        {
            errors.push(format!(
                "Phone default_country_code '{}' must not start with 0",
                self.phone.default_country_code
            ));
        }
        if self.phone.national_min_len == 0 {
            errors.push("Phone national_min_len must be at least 1".to_string());
        }
        if self.phone.national_min_len > self.phone.national_max_len {
            errors.push(format!(
                "Phone national_min_len ({}) exceeds national_max_len ({})",
                self.phone.national_min_len, self.phone.national_max_len
            ));
        }
        for id in &self.phone.regional_rules {
            if rule_by_id(id).is_none() {
                errors.push(format!("Unknown regional phone rule '{}'", id));
            }
        }

        if let Some(base_url) = &self.messaging.base_url {
            if url::Url::parse(base_url).is_err() {
                errors.push(format!("Messaging base_url '{}' is not a valid URL", base_url));
            }
        }

        let mut ids: Vec<&String> = self.sessions.keys().collect();
        ids.sort();
        for id in ids {
            let session = &self.sessions[id];
            if id.trim().is_empty() {
                errors.push("Session id must not be empty".to_string());
            }
            if url::Url::parse(&session.crm.base_url).is_err() {
                errors.push(format!(
                    "Session '{}': crm base_url '{}' is not a valid URL",
                    id, session.crm.base_url
                ));
            }
            if session.crm.account_id == 0 {
                errors.push(format!("Session '{}': crm account_id must be set", id));
            }
            if session.crm.inbox_id == 0 {
                errors.push(format!("Session '{}': crm inbox_id must be set", id));
            }
            if session.crm.api_token.expose_secret().trim().is_empty() {
                errors.push(format!("Session '{}': crm api_token must not be empty", id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Get a session binding by messaging session id.
    pub fn get_session(&self, id: &str) -> Option<&SessionConfig> {
        self.sessions.get(id)
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let mut config = match Self::load_default() {
            Ok(config) => config,
            Err(e) if e.is_not_found() => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `WABRIDGE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env::get_u16(env::vars::WABRIDGE_PORT) {
            self.gateway.port = port;
        }
        if let Some(url) = env::get_var(env::vars::WABRIDGE_DATABASE_URL) {
            self.storage.database_url = Some(url);
        }
        if let Some(token) = env::get_var(env::vars::WABRIDGE_AUTH_TOKEN) {
            self.gateway.auth_token = Some(SecretString::new(token));
        }
    }

    /// Resolved database URL: the configured one, or a SQLite file under the base directory.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        match &self.storage.database_url {
            Some(url) => Ok(url.clone()),
            None => Ok(format!("sqlite://{}?mode=rwc", paths::database_file()?.display())),
        }
    }
}

/// Configuration builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gateway port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.gateway.port = port;
        self
    }

    /// Set the bind mode.
    pub fn bind(mut self, mode: BindMode) -> Self {
        self.config.gateway.bind = mode;
        self
    }

    /// Set the admin bearer token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.gateway.auth_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set the database URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.storage.database_url = Some(url.into());
        self
    }

    /// Set the webhook processing delay.
    pub fn webhook_delay_ms(mut self, ms: u64) -> Self {
        self.config.bridge.webhook_delay_ms = ms;
        self
    }

    /// Set the messaging session manager base URL.
    pub fn messaging_url(mut self, url: impl Into<String>) -> Self {
        self.config.messaging.base_url = Some(url.into());
        self
    }

    /// Bind a messaging session to a CRM inbox.
    pub fn session(
        mut self,
        id: impl Into<String>,
        base_url: impl Into<String>,
        account_id: u64,
        inbox_id: u64,
        api_token: impl Into<String>,
    ) -> Self {
        self.config.sessions.insert(
            id.into(),
            SessionConfig {
                enabled: true,
                crm: CrmConfig {
                    base_url: base_url.into(),
                    account_id,
                    inbox_id,
                    api_token: SecretString::new(api_token.into()),
                    timeout_secs: 30,
                },
                sign_messages: false,
            },
        );
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the config.
    pub fn build(self) -> Config {
        self.config
    }

    /// Validate and build the config, returning an error if validation fails.
    pub fn build_validated(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
