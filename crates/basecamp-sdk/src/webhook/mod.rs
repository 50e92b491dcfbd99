//! Basecamp webhook intake.
//!
//! This module verifies, parses, deduplicates, and dispatches webhook
//! deliveries.
//!
//! # Core Components
//!
//! - [`WebhookReceiver`] - Delivery pipeline and handler registry
//! - [`WebhookHandler`] / [`WebhookMiddleware`] - Application extension points
//! - [`KindPattern`] - Exact, prefix, suffix, and catch-all routing
//! - [`DedupWindow`] - Bounded memory of delivered event ids
//! - [`compute_signature`] / [`verify_signature`] - HMAC-SHA256 signatures
//! - [`WebhookEvent`] / [`EventKind`] - Payload types and kind parsing
//!
//! # Security
//!
//! Signatures are HMAC-SHA256 over the raw body, compared in constant time.
//! Configure a secret in production: without one the receiver accepts any
//! well-formed body.
//!
//! # HTTP Server Integration (Axum Example)
//!
//! ```rust,ignore
//! use basecamp_sdk::webhook::WebhookReceiver;
//! use axum::{extract::State, http::{HeaderMap, Method, StatusCode}, routing::post, Router};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! async fn handle_webhook(
//!     State(receiver): State<Arc<WebhookReceiver>>,
//!     method: Method,
//!     headers: HeaderMap,
//!     body: Bytes,
//! ) -> StatusCode {
//!     let response = receiver.receive(method.as_str(), &body, &headers).await;
//!     StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
//! }
//!
//! let app = Router::new()
//!     .route("/webhooks/basecamp", post(handle_webhook))
//!     .with_state(receiver);
//! ```

pub mod dedup;
pub mod event;
pub mod handler;
pub mod pattern;
pub mod receiver;
pub mod signature;

// Re-export main types
pub use dedup::{DedupWindow, DEFAULT_DEDUP_WINDOW_SIZE};
pub use event::{
    parse_event_kind, recording_types, EventId, EventKind, Person, WebhookCopy, WebhookEvent,
    WebhookRecording,
};
pub use handler::{handler_fn, DispatchFuture, FnHandler, Next, WebhookHandler, WebhookMiddleware};
pub use pattern::KindPattern;
pub use receiver::{
    HeaderFn, HeaderLookup, WebhookReceiver, WebhookReceiverConfig, WebhookResponse,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_SIGNATURE_HEADER,
};
pub use signature::{compute_signature, verify_signature, SignatureVerifier};
