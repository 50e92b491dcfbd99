//! File and environment configuration for the SDK's components.
//!
//! Settings are layered: built-in defaults, then an optional YAML, TOML, or
//! JSON file, then `BASECAMP__`-prefixed environment variables using `__` as
//! the nesting separator:
//!
//! ```text
//! BASECAMP__CLIENT__BASE_URL=https://3.basecampapi.com/999999999
//! BASECAMP__CLIENT__ALLOWED_ORIGINS=https://storage.3.basecamp.com
//! BASECAMP__WEBHOOK__SECRET=...
//! BASECAMP__OAUTH__TIMEOUT_SECS=10
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::client::{ClientConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_PAGES};
use crate::error::SettingsError;
use crate::oauth::{OAuthConfig, DEFAULT_MAX_OAUTH_RESPONSE_BYTES};
use crate::security::{MAX_ERROR_MESSAGE_BYTES, MAX_RESPONSE_BODY_BYTES};
use crate::webhook::{
    WebhookReceiverConfig, DEFAULT_DEDUP_WINDOW_SIZE, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_SIGNATURE_HEADER,
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BASECAMP";

/// Top-level SDK settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkSettings {
    pub client: ClientSettings,
    pub webhook: WebhookSettings,
    pub oauth: OAuthSettings,
}

/// API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub base_url: String,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
    pub max_pages: usize,
    pub max_response_bytes: u64,
    pub max_redirects: usize,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    /// Directory for a persistent cache; memory only when unset.
    pub cache_dir: Option<PathBuf>,
    /// A list in files; a comma-separated string in the environment.
    #[serde(deserialize_with = "string_or_list")]
    pub allowed_origins: Vec<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: ClientConfig::default().base_url,
            user_agent: None,
            timeout_secs: 30,
            max_pages: DEFAULT_MAX_PAGES,
            max_response_bytes: MAX_RESPONSE_BODY_BYTES,
            max_redirects: 10,
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_dir: None,
            allowed_origins: Vec::new(),
        }
    }
}

/// Webhook receiver settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub secret: Option<String>,
    pub signature_header: String,
    pub max_body_bytes: usize,
    pub dedup_window_size: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            dedup_window_size: DEFAULT_DEDUP_WINDOW_SIZE,
        }
    }
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .field("signature_header", &self.signature_header)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("dedup_window_size", &self.dedup_window_size)
            .finish()
    }
}

/// OAuth client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub timeout_secs: u64,
    pub max_response_bytes: u64,
    pub max_error_message_len: usize,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_response_bytes: DEFAULT_MAX_OAUTH_RESPONSE_BYTES,
            max_error_message_len: MAX_ERROR_MESSAGE_BYTES,
        }
    }
}

impl SdkSettings {
    /// Load settings from an optional file and the environment, then validate.
    ///
    /// The file format follows its extension (`.yaml`, `.yml`, `.toml`,
    /// `.json`). A missing file is an error when a path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading SDK settings file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: SdkSettings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.client_config().validate()?;
        self.webhook_config().validate()?;
        self.oauth_config().validate()?;
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            base_url: self.client.base_url.clone(),
            user_agent: self.client.user_agent.clone().unwrap_or(defaults.user_agent),
            timeout: Duration::from_secs(self.client.timeout_secs),
            max_pages: self.client.max_pages,
            max_response_bytes: self.client.max_response_bytes,
            max_redirects: self.client.max_redirects,
            cache_enabled: self.client.cache_enabled,
            cache_capacity: self.client.cache_capacity,
            cache_dir: self.client.cache_dir.clone(),
            allowed_origins: self.client.allowed_origins.clone(),
        }
    }

    pub fn webhook_config(&self) -> WebhookReceiverConfig {
        WebhookReceiverConfig {
            secret: self.webhook.secret.clone(),
            signature_header: self.webhook.signature_header.clone(),
            max_body_bytes: self.webhook.max_body_bytes,
            dedup_window_size: self.webhook.dedup_window_size,
        }
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig::default()
            .with_timeout(Duration::from_secs(self.oauth.timeout_secs))
            .with_max_response_bytes(self.oauth.max_response_bytes)
            .with_max_error_message_len(self.oauth.max_error_message_len)
    }
}

/// Environment values arrive as plain strings, so a list may be given as
/// `a,b,c`.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        List(Vec<String>),
        String(String),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::List(items) => items,
        StringOrList::String(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
