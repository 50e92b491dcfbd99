//! Error types for Basecamp SDK operations.
//!
//! This module defines all error types used throughout the SDK, with proper
//! classification for retry logic and enough context for debugging. Error
//! messages never carry secrets, and server-supplied text is truncated before
//! it is embedded.

use thiserror::Error;

/// Error type returned by webhook handlers and middleware.
///
/// Handlers are arbitrary application code, so any error type can be boxed
/// into this alias and propagated back to the `handle_request` caller.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Webhook signature verification failure.
///
/// Raised when a secret is configured and the delivery carries no signature or
/// a signature that does not match the raw body.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WebhookVerificationError {
    pub message: String,
}

impl WebhookVerificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while receiving a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing or invalid signature (non-retryable, delivery rejected).
    #[error(transparent)]
    Verification(#[from] WebhookVerificationError),

    /// The body is not a valid webhook event document.
    #[error("Failed to parse webhook event: {0}")]
    Parse(#[from] serde_json::Error),

    /// The body exceeded the receiver's size limit.
    #[error("Webhook payload exceeds {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// A middleware or handler returned an error. The event was not recorded
    /// as delivered, so a redelivery will run the chain again.
    #[error("Webhook handler failed: {0}")]
    Handler(HandlerError),
}

impl WebhookError {
    /// Check whether this error is a signature verification failure.
    pub fn is_verification(&self) -> bool {
        matches!(self, Self::Verification(_))
    }

    /// HTTP status code a webhook endpoint should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Verification(_) => 401,
            Self::Parse(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::Handler(_) => 500,
        }
    }
}

/// Violations of the outbound request-safety policy.
///
/// These are always fatal for the operation that triggered them; the SDK never
/// downgrades them to warnings or retries around them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityPolicyError {
    /// A pagination `Link` header resolved to another origin.
    #[error("pagination Link header points to different origin: {url}")]
    CrossOriginLink { url: String },

    /// A redirect tried to move a credentialed request to another origin.
    #[error("redirect points to different origin: {url}")]
    CrossOriginRedirect { url: String },

    /// An endpoint that carries credentials does not use HTTPS.
    #[error("endpoint must use HTTPS: {url}")]
    InsecureEndpoint { url: String },

    /// The response body is larger than the configured ceiling.
    #[error("response body too large: exceeds {limit} byte limit")]
    ResponseTooLarge { limit: u64 },

    /// The body cannot be bounded: the transport cannot stream and the
    /// declared length is unusable.
    #[error("cannot bound response body: no valid Content-Length (got {value:?})")]
    InvalidContentLength { value: String },

    /// A URL could not be parsed or resolved.
    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Errors during Basecamp API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP response from the API.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The server answered 304 for a request the cache cannot satisfy.
    #[error("304 received but no cached response available")]
    NotModifiedWithoutCache,

    /// HTTP client error (network, TLS, timeout, refused redirect).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request was blocked by the request-safety policy.
    #[error(transparent)]
    Security(#[from] SecurityPolicyError),

    /// The connection failed while the response body was being read.
    #[error("Failed to read response body: {message}")]
    BodyRead { message: String },

    /// The token provider could not supply a credential.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The request was invalid before it was sent.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The client could not be constructed from its configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Failed to parse a JSON response body.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status associated with this error, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NotModifiedWithoutCache => Some(304),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error represents a transient condition that may succeed if retried.
    ///
    /// Security policy violations are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::NotModifiedWithoutCache => true,
            Self::Network(e) => !e.is_redirect() && !e.is_builder(),
            Self::Security(_) => false,
            Self::BodyRead { .. } => true,
            Self::Authentication { .. } => false,
            Self::InvalidRequest { .. } => false,
            Self::Configuration { .. } => false,
            Self::Json(_) => false,
        }
    }
}

/// Errors from OAuth discovery, code exchange, and token refresh.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Request parameters were missing or malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The endpoint or response violated the request-safety policy.
    #[error(transparent)]
    Security(#[from] SecurityPolicyError),

    /// Transport failure before a response was received.
    #[error("{operation} request failed: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{operation} failed with status {status}: {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The token endpoint returned an OAuth error document.
    #[error("token error: {code}{}", .description.as_ref().map(|d| format!(" - {d}")).unwrap_or_default())]
    TokenRejected {
        code: String,
        description: Option<String>,
    },

    /// The discovery document lacked mandatory fields.
    #[error("discovery document is missing required fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    /// The response body was not the expected JSON document.
    #[error("parsing {operation} response: {message}")]
    Parse {
        operation: &'static str,
        message: String,
    },
}

impl OAuthError {
    /// HTTP status associated with this error, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors during ETag cache operations.
///
/// Cache errors are non-fatal: callers fall back to an unconditional request.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cache operation failed for a specific reason.
    #[error("Cache operation failed: {message}")]
    OperationFailed { message: String },

    /// Reading or writing the cache directory failed.
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Input validation errors.
///
/// These errors occur when validating user input or configuration data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing.
    #[error("Required field missing: {field}")]
    Required { field: String },

    /// A field has an invalid format.
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    /// A field value is out of the acceptable range.
    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Errors while loading SDK settings from files and the environment.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A source could not be read or deserialized.
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// The merged settings failed validation.
    #[error("Invalid settings: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
