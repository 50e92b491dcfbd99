//! OAuth 2.0 discovery, authorization-code exchange, and token refresh.
//!
//! Every call made by [`OAuthClient`] is held to the same rules:
//!
//! - endpoints must be HTTPS, except loopback hosts used for local testing
//! - response bodies are bounded (1 MiB by default) before they are buffered
//! - server text embedded in errors is truncated
//!
//! # Examples
//!
//! ```rust,no_run
//! use basecamp_sdk::oauth::{ExchangeRequest, OAuthClient, OAuthConfig, Pkce};
//!
//! # async fn example() -> Result<(), basecamp_sdk::error::OAuthError> {
//! let oauth = OAuthClient::new(OAuthConfig::default())?;
//! let server = oauth.discover("https://launchpad.37signals.com").await?;
//!
//! let pkce = Pkce::generate();
//! // ... redirect the user with pkce.challenge(), receive `code` on the callback ...
//! # let code = String::new();
//!
//! let token = oauth
//!     .exchange_code(&ExchangeRequest {
//!         token_endpoint: server.token_endpoint,
//!         code,
//!         redirect_uri: "https://app.example/callback".to_string(),
//!         client_id: "client-id".to_string(),
//!         code_verifier: Some(pkce.verifier().to_string()),
//!         ..Default::default()
//!     })
//!     .await?;
//! assert!(!token.is_expired());
//! # Ok(())
//! # }
//! ```

mod pkce;
mod types;

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{OAuthError, ValidationError};
use crate::security::{require_secure_endpoint, truncate_message, MAX_ERROR_MESSAGE_BYTES};
use crate::transport::{read_limited, BodyReadError, HttpTransport, ReqwestTransport, TransportResponse};

pub use pkce::{generate_state, Pkce, CHALLENGE_METHOD};
pub use types::{
    is_token_expired, ExchangeRequest, OAuthServerConfig, OAuthToken, RefreshRequest,
    DEFAULT_EXPIRY_BUFFER_SECS,
};

use types::TokenErrorBody;

/// Path of the authorization server metadata document.
pub const DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";

/// Default ceiling on discovery and token response bodies (1 MiB).
pub const DEFAULT_MAX_OAUTH_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Limits and transport settings for [`OAuthClient`].
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_response_bytes: u64,
    pub max_error_message_len: usize,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("basecamp-sdk-rust/{}", env!("CARGO_PKG_VERSION")),
            max_response_bytes: DEFAULT_MAX_OAUTH_RESPONSE_BYTES,
            max_error_message_len: MAX_ERROR_MESSAGE_BYTES,
        }
    }
}

impl OAuthConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, max_response_bytes: u64) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    pub fn with_max_error_message_len(mut self, max_error_message_len: usize) -> Self {
        self.max_error_message_len = max_error_message_len;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_response_bytes == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_response_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_error_message_len < 4 {
            return Err(ValidationError::OutOfRange {
                field: "max_error_message_len".to_string(),
                message: "must be at least 4".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: "timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Client for the OAuth authorization server.
///
/// Stateless apart from its transport; safe to share across tasks.
#[derive(Clone)]
pub struct OAuthClient {
    transport: Arc<dyn HttpTransport>,
    config: OAuthConfig,
}

impl OAuthClient {
    /// Create a client backed by `reqwest`.
    pub fn new(config: OAuthConfig) -> Result<Self, OAuthError> {
        config.validate()?;
        let transport =
            ReqwestTransport::new(config.timeout, &config.user_agent).map_err(|e| OAuthError::Network {
                operation: "client setup",
                message: e.to_string(),
            })?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: OAuthConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Fetch the authorization server metadata below `base_url`.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::Security`] for a non-HTTPS URL or an unbounded/oversized body
    /// - [`OAuthError::Http`] for a non-200 answer
    /// - [`OAuthError::MissingFields`] when `issuer`, `authorization_endpoint`
    ///   or `token_endpoint` is absent
    pub async fn discover(&self, base_url: &str) -> Result<OAuthServerConfig, OAuthError> {
        const OPERATION: &str = "discovery";

        let url = require_secure_endpoint(&format!(
            "{}{}",
            base_url.trim().trim_end_matches('/'),
            DISCOVERY_PATH
        ))?;

        debug!(url = %url, "Fetching OAuth server metadata");
        let response = self
            .transport
            .get_json(&url)
            .await
            .map_err(|e| network_error(OPERATION, &*e))?;
        let (status, body) = self.read_response(OPERATION, response).await?;

        if status != 200 {
            return Err(OAuthError::Http {
                operation: OPERATION,
                status,
                body: self.truncate(&String::from_utf8_lossy(&body)),
            });
        }

        let config: OAuthServerConfig =
            serde_json::from_slice(&body).map_err(|e| OAuthError::Parse {
                operation: OPERATION,
                message: e.to_string(),
            })?;

        let missing = config.missing_fields();
        if !missing.is_empty() {
            warn!(url = %url, missing = ?missing, "OAuth discovery document is incomplete");
            return Err(OAuthError::MissingFields { fields: missing });
        }

        debug!(issuer = %config.issuer, "OAuth server metadata loaded");
        Ok(config)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, request: &ExchangeRequest) -> Result<OAuthToken, OAuthError> {
        request.validate()?;
        self.token_request("token exchange", &request.token_endpoint, request.form())
            .await
    }

    /// Obtain a new access token from a refresh token.
    pub async fn refresh_token(&self, request: &RefreshRequest) -> Result<OAuthToken, OAuthError> {
        request.validate()?;
        self.token_request("token refresh", &request.token_endpoint, request.form())
            .await
    }

    async fn token_request(
        &self,
        operation: &'static str,
        endpoint: &str,
        form: Vec<(&'static str, String)>,
    ) -> Result<OAuthToken, OAuthError> {
        let url = require_secure_endpoint(endpoint)?;

        debug!(operation, url = %url, "Sending OAuth token request");
        let response = self
            .transport
            .post_form(&url, &form)
            .await
            .map_err(|e| network_error(operation, &*e))?;
        let (status, body) = self.read_response(operation, response).await?;

        if status != 200 {
            return Err(self.token_error(operation, status, &body));
        }

        let mut token: OAuthToken = serde_json::from_slice(&body).map_err(|e| OAuthError::Parse {
            operation,
            message: e.to_string(),
        })?;
        token.stamp_expiry(Utc::now());

        info!(
            operation,
            token_type = %token.token_type,
            expires_in = ?token.expires_in,
            has_refresh_token = token.refresh_token.is_some(),
            "OAuth token issued"
        );
        Ok(token)
    }

    fn token_error(&self, operation: &'static str, status: u16, body: &[u8]) -> OAuthError {
        if let Ok(document) = serde_json::from_slice::<TokenErrorBody>(body) {
            if !document.error.is_empty() {
                warn!(operation, status, code = %document.error, "OAuth token request rejected");
                return OAuthError::TokenRejected {
                    code: self.truncate(&document.error),
                    description: document
                        .error_description
                        .filter(|d| !d.is_empty())
                        .map(|d| self.truncate(&d)),
                };
            }
        }

        warn!(operation, status, "OAuth token request failed");
        OAuthError::Http {
            operation,
            status,
            body: self.truncate(&String::from_utf8_lossy(body)),
        }
    }

    async fn read_response(
        &self,
        operation: &'static str,
        mut response: TransportResponse,
    ) -> Result<(u16, Bytes), OAuthError> {
        let body = read_limited(response.body.as_mut(), self.config.max_response_bytes)
            .await
            .map_err(|e| match e {
                BodyReadError::Policy(policy) => OAuthError::Security(policy),
                BodyReadError::Transport(e) => network_error(operation, &*e),
            })?;
        Ok((response.status, body))
    }

    fn truncate(&self, text: &str) -> String {
        truncate_message(text.trim(), self.config.max_error_message_len)
    }
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn network_error(operation: &'static str, error: &(dyn std::error::Error + Send + Sync)) -> OAuthError {
    OAuthError::Network {
        operation,
        message: truncate_message(&error.to_string(), MAX_ERROR_MESSAGE_BYTES),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
