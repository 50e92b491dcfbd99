//! OAuth data types: server metadata, tokens, and request parameters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Seconds before expiry at which a token is already treated as expired.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;

/// Authorization server metadata from the discovery document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthServerConfig {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
}

impl OAuthServerConfig {
    /// Names of mandatory fields that are absent or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("issuer", &self.issuer),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Access token issued by the token endpoint.
///
/// `expires_at` is not part of the wire format; it is computed from
/// `expires_in` when the token is received. The token strings are never
/// exposed in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Create a bearer token without expiry information.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_in: None,
            expires_at: None,
            scope: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Derive `expires_at` from `expires_in`, counted from `issued_at`.
    pub(crate) fn stamp_expiry(&mut self, issued_at: DateTime<Utc>) {
        if let Some(seconds) = self.expires_in.filter(|s| *s > 0) {
            self.expires_at = Some(issued_at + Duration::seconds(seconds));
        }
    }

    /// Check expiry with the default 60 second buffer.
    pub fn is_expired(&self) -> bool {
        is_token_expired(self, Duration::seconds(DEFAULT_EXPIRY_BUFFER_SECS))
    }

    /// Check whether the token expires within `margin`.
    ///
    /// Tokens without an expiry never expire soon.
    pub fn expires_soon(&self, margin: Duration) -> bool {
        is_token_expired(self, margin)
    }

    /// Time left before expiry, if the expiry is known.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<REDACTED>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// True iff the token has a known expiry and `now + buffer >= expires_at`.
pub fn is_token_expired(token: &OAuthToken, buffer: Duration) -> bool {
    token
        .expires_at
        .is_some_and(|expires_at| Utc::now() + buffer >= expires_at)
}

/// Parameters for exchanging an authorization code.
#[derive(Clone, Default)]
pub struct ExchangeRequest {
    pub token_endpoint: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// PKCE verifier matching the challenge sent with the authorization request.
    pub code_verifier: Option<String>,
    /// Send `type=web_server` instead of `grant_type=authorization_code`.
    pub use_legacy_format: bool,
}

impl ExchangeRequest {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        require("token_endpoint", &self.token_endpoint)?;
        require("code", &self.code)?;
        require("redirect_uri", &self.redirect_uri)?;
        require("client_id", &self.client_id)
    }

    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![if self.use_legacy_format {
            ("type", "web_server".to_string())
        } else {
            ("grant_type", "authorization_code".to_string())
        }];
        form.push(("code", self.code.clone()));
        form.push(("redirect_uri", self.redirect_uri.clone()));
        form.push(("client_id", self.client_id.clone()));
        push_present(&mut form, "client_secret", &self.client_secret);
        push_present(&mut form, "code_verifier", &self.code_verifier);
        form
    }
}

impl std::fmt::Debug for ExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRequest")
            .field("token_endpoint", &self.token_endpoint)
            .field("code", &"<REDACTED>")
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<REDACTED>"))
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "<REDACTED>"))
            .field("use_legacy_format", &self.use_legacy_format)
            .finish()
    }
}

/// Parameters for refreshing an access token.
#[derive(Clone, Default)]
pub struct RefreshRequest {
    pub token_endpoint: String,
    pub refresh_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Send `type=refresh` instead of `grant_type=refresh_token`.
    pub use_legacy_format: bool,
}

impl RefreshRequest {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        require("token_endpoint", &self.token_endpoint)?;
        require("refresh_token", &self.refresh_token)
    }

    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![if self.use_legacy_format {
            ("type", "refresh".to_string())
        } else {
            ("grant_type", "refresh_token".to_string())
        }];
        form.push(("refresh_token", self.refresh_token.clone()));
        push_present(&mut form, "client_id", &self.client_id);
        push_present(&mut form, "client_secret", &self.client_secret);
        form
    }
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("token_endpoint", &self.token_endpoint)
            .field("refresh_token", &"<REDACTED>")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<REDACTED>"))
            .field("use_legacy_format", &self.use_legacy_format)
            .finish()
    }
}

/// OAuth error document returned by a token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required {
            field: field.to_string(),
        })
    } else {
        Ok(())
    }
}

fn push_present(form: &mut Vec<(&'static str, String)>, name: &'static str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        form.push((name, value.to_string()));
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
