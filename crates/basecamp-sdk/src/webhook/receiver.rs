//! Webhook receiver: verification, parsing, deduplication, and dispatch.
//!
//! The receiver runs every delivery through the same pipeline:
//!
//! 1. Verify the signature (only when a secret is configured)
//! 2. Parse the body into a [`WebhookEvent`]
//! 3. Return early if the event id is in the dedup window
//! 4. Run the middleware chain, which ends in handler dispatch
//! 5. Record the event id once everything above succeeded
//!
//! Any failure is returned to the caller and leaves the dedup window
//! untouched, so a redelivery of a failed event runs the handlers again.
//!
//! # Concurrency
//!
//! The dedup check and the dedup record are separate steps. Sequential
//! redeliveries run handlers at most once, but two concurrent deliveries of the
//! same event may both be dispatched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use basecamp_sdk::webhook::{handler_fn, WebhookReceiver, WebhookReceiverConfig};
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let receiver = WebhookReceiver::new(
//!     WebhookReceiverConfig::default().with_secret("webhook-secret"),
//! );
//!
//! receiver
//!     .on("todo_*", handler_fn(|event| {
//!         println!("todo event {}", event.kind);
//!         Ok(())
//!     }))
//!     .await;
//!
//! let headers = HashMap::from([
//!     ("X-Basecamp-Signature".to_string(), "9f2c...".to_string()),
//! ]);
//! let body = br#"{"id":1,"kind":"todo_created"}"#;
//!
//! let response = receiver.receive("POST", body, &headers).await;
//! println!("Status: {}", response.status_code());
//! # Ok(())
//! # }
//! ```

use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ValidationError, WebhookError, WebhookVerificationError};
use crate::webhook::dedup::{DedupWindow, DEFAULT_DEDUP_WINDOW_SIZE};
use crate::webhook::event::WebhookEvent;
use crate::webhook::handler::{HandlerSet, Next, Registration, WebhookHandler, WebhookMiddleware};
use crate::webhook::pattern::KindPattern;
use crate::webhook::signature::SignatureVerifier;

/// Default header carrying the delivery signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-basecamp-signature";

/// Default limit on the size of a delivery body (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// Header Access
// ============================================================================

/// Case-insensitive read access to request headers.
///
/// Implemented for `HashMap<String, String>`, for `http::HeaderMap`, and for
/// accessor closures wrapped in [`HeaderFn`].
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<String>;
}

impl HeaderLookup for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<String> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .cloned()
    }
}

impl HeaderLookup for HeaderMap {
    fn header(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }
}

/// Header accessor backed by a closure.
///
/// ```rust
/// use basecamp_sdk::webhook::{HeaderFn, HeaderLookup};
///
/// let headers = HeaderFn(|name: &str| {
///     (name.eq_ignore_ascii_case("x-basecamp-signature")).then(|| "abc".to_string())
/// });
/// assert_eq!(headers.header("X-Basecamp-Signature").as_deref(), Some("abc"));
/// ```
pub struct HeaderFn<F>(pub F);

impl<F> HeaderLookup for HeaderFn<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn header(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }
}

// ============================================================================
// Webhook Response
// ============================================================================

/// HTTP-level outcome of [`WebhookReceiver::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookResponse {
    /// 200 OK - Delivery processed (or already processed)
    Ok { message: String, event_id: String },

    /// 400 Bad Request - Body is not a webhook event
    BadRequest { message: String },

    /// 401 Unauthorized - Missing or invalid signature
    Unauthorized { message: String },

    /// 405 Method Not Allowed - Deliveries must be POSTed
    MethodNotAllowed { message: String },

    /// 413 Payload Too Large - Body exceeds the configured limit
    PayloadTooLarge { message: String },

    /// 500 Internal Server Error - A middleware or handler failed
    InternalError { message: String },
}

impl WebhookResponse {
    /// Get the HTTP status code for this response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Ok { .. } => 200,
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::MethodNotAllowed { .. } => 405,
            Self::PayloadTooLarge { .. } => 413,
            Self::InternalError { .. } => 500,
        }
    }

    /// Get the response message.
    pub fn message(&self) -> &str {
        match self {
            Self::Ok { message, .. }
            | Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::MethodNotAllowed { message }
            | Self::PayloadTooLarge { message }
            | Self::InternalError { message } => message,
        }
    }

    /// Check if response indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

// ============================================================================
// Receiver Configuration
// ============================================================================

/// Configuration for a [`WebhookReceiver`].
#[derive(Clone)]
pub struct WebhookReceiverConfig {
    /// Shared secret. `None` disables signature verification.
    pub secret: Option<String>,

    /// Header carrying the signature.
    pub signature_header: String,

    /// Largest body accepted by [`WebhookReceiver::receive`].
    pub max_body_bytes: usize,

    /// Number of event ids remembered for deduplication; 0 disables it.
    pub dedup_window_size: usize,
}

impl Default for WebhookReceiverConfig {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            dedup_window_size: DEFAULT_DEDUP_WINDOW_SIZE,
        }
    }
}

impl WebhookReceiverConfig {
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into();
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_dedup_window_size(mut self, size: usize) -> Self {
        self.dedup_window_size = size;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.signature_header.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "signature_header".to_string(),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_body_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if matches!(&self.secret, Some(secret) if secret.is_empty()) {
            return Err(ValidationError::InvalidFormat {
                field: "secret".to_string(),
                message: "must not be empty when set".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookReceiverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReceiverConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .field("signature_header", &self.signature_header)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("dedup_window_size", &self.dedup_window_size)
            .finish()
    }
}

// ============================================================================
// Webhook Receiver
// ============================================================================

/// Receives Basecamp webhook deliveries and dispatches them to handlers.
///
/// # Deduplication
///
/// An event id is recorded only after every middleware and handler succeeded,
/// so a failed delivery runs again when Basecamp retries it. The duplicate
/// check and the record are separate steps: redeliveries that arrive one
/// after another run handlers once, but two copies of an event processed
/// concurrently can both reach the handlers.
pub struct WebhookReceiver {
    verifier: Option<SignatureVerifier>,
    signature_header: String,
    max_body_bytes: usize,
    dedup: DedupWindow,
    handlers: Arc<RwLock<Vec<Registration>>>,
    middleware: Arc<RwLock<Vec<Arc<dyn WebhookMiddleware>>>>,
}

impl WebhookReceiver {
    /// Create a receiver from its configuration.
    ///
    /// An empty secret is treated the same as no secret: verification is
    /// skipped. Use [`WebhookReceiverConfig::validate`] to reject it instead.
    pub fn new(config: WebhookReceiverConfig) -> Self {
        let verifier = config
            .secret
            .filter(|secret| !secret.is_empty())
            .map(SignatureVerifier::new);

        if verifier.is_none() {
            warn!("Webhook receiver created without a secret; signatures will not be verified");
        }

        Self {
            verifier,
            signature_header: config.signature_header,
            max_body_bytes: config.max_body_bytes,
            dedup: DedupWindow::new(config.dedup_window_size),
            handlers: Arc::new(RwLock::new(Vec::new())),
            middleware: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a handler for events whose kind matches `pattern`.
    ///
    /// `pattern` is an exact kind (`todo_created`), a prefix glob (`todo_*`),
    /// a suffix glob (`*_created`), or `*`.
    pub async fn on(&self, pattern: impl Into<KindPattern>, handler: Arc<dyn WebhookHandler>) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, "Registering webhook handler");
        self.handlers.write().await.push(Registration { pattern, handler });
    }

    /// Register a handler for every event.
    pub async fn on_any(&self, handler: Arc<dyn WebhookHandler>) {
        self.on(KindPattern::Any, handler).await;
    }

    /// Append a middleware to the chain. The first one registered runs outermost.
    pub async fn use_middleware(&self, middleware: Arc<dyn WebhookMiddleware>) {
        self.middleware.write().await.push(middleware);
    }

    /// The receiver's dedup window.
    pub fn dedup_window(&self) -> &DedupWindow {
        &self.dedup
    }

    /// Process a delivery and return the parsed event.
    ///
    /// `body` must be the exact bytes received; the signature covers them.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::Verification`] if a secret is configured and the
    ///   signature is missing or wrong
    /// - [`WebhookError::Parse`] if the body is not a JSON event
    /// - [`WebhookError::Handler`] if a middleware or handler failed
    ///
    /// # Examples
    ///
    /// ```rust
    /// use basecamp_sdk::webhook::{compute_signature, WebhookReceiver, WebhookReceiverConfig};
    /// use std::collections::HashMap;
    ///
    /// # tokio_test::block_on(async {
    /// let receiver = WebhookReceiver::new(WebhookReceiverConfig::default().with_secret("s3cret"));
    ///
    /// let body = br#"{"id": 9007199254740993, "kind": "todo_completed"}"#;
    /// let mut headers = HashMap::new();
    /// headers.insert(
    ///     "X-Basecamp-Signature".to_string(),
    ///     compute_signature(body, "s3cret"),
    /// );
    ///
    /// let event = receiver.handle_request(body, &headers).await.unwrap();
    /// assert_eq!(event.id.as_str(), "9007199254740993");
    /// assert_eq!(event.parsed_kind().action, "completed");
    /// # });
    /// ```
    pub async fn handle_request<H>(&self, body: &[u8], headers: &H) -> Result<WebhookEvent, WebhookError>
    where
        H: HeaderLookup + ?Sized,
    {
        if let Some(verifier) = &self.verifier {
            let signature = headers
                .header(&self.signature_header)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    warn!(header = %self.signature_header, "Webhook delivery missing signature");
                    WebhookVerificationError::new("missing webhook signature")
                })?;

            if !verifier.verify(body, &signature) {
                warn!("Invalid webhook signature");
                return Err(WebhookVerificationError::new("invalid webhook signature").into());
            }
        }

        let event: WebhookEvent = serde_json::from_slice(body)?;

        if self.dedup.seen(event.id.as_str()) {
            debug!(event_id = %event.id, kind = %event.kind, "Duplicate webhook delivery skipped");
            return Ok(event);
        }

        // Snapshot registrations so handlers added mid-delivery wait for the next one.
        let handlers = Arc::new(HandlerSet::new(self.handlers.read().await.clone()));
        let chain: Arc<[Arc<dyn WebhookMiddleware>]> =
            Arc::from(self.middleware.read().await.clone());

        Next::new(chain, handlers)
            .run(&event)
            .await
            .map_err(WebhookError::Handler)?;

        self.dedup.record(event.id.as_str());

        info!(event_id = %event.id, kind = %event.kind, "Webhook event processed");
        Ok(event)
    }

    /// HTTP adapter around [`handle_request`](Self::handle_request).
    ///
    /// Maps the outcome onto the status an endpoint should return. Only `POST`
    /// is accepted, and bodies larger than `max_body_bytes` are refused before
    /// verification.
    pub async fn receive<H>(&self, method: &str, body: &[u8], headers: &H) -> WebhookResponse
    where
        H: HeaderLookup + ?Sized,
    {
        if !method.eq_ignore_ascii_case("POST") {
            return WebhookResponse::MethodNotAllowed {
                message: "method not allowed".to_string(),
            };
        }

        if body.len() > self.max_body_bytes {
            let err = WebhookError::PayloadTooLarge {
                limit: self.max_body_bytes,
            };
            warn!(size = body.len(), limit = self.max_body_bytes, "Webhook payload rejected");
            return WebhookResponse::PayloadTooLarge {
                message: err.to_string(),
            };
        }

        match self.handle_request(body, headers).await {
            Ok(event) => WebhookResponse::Ok {
                message: "ok".to_string(),
                event_id: event.id.to_string(),
            },
            Err(err @ WebhookError::Verification(_)) => WebhookResponse::Unauthorized {
                message: err.to_string(),
            },
            Err(err @ WebhookError::Parse(_)) => {
                warn!(error = %err, "Malformed webhook payload");
                WebhookResponse::BadRequest {
                    message: "invalid webhook payload".to_string(),
                }
            }
            Err(err @ WebhookError::PayloadTooLarge { .. }) => WebhookResponse::PayloadTooLarge {
                message: err.to_string(),
            },
            Err(err @ WebhookError::Handler(_)) => {
                warn!(error = %err, "Webhook handler failed");
                WebhookResponse::InternalError {
                    message: "handler error".to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for WebhookReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReceiver")
            .field("verifies_signatures", &self.verifier.is_some())
            .field("signature_header", &self.signature_header)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("dedup", &self.dedup)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "receiver_tests.rs"]
mod tests;
