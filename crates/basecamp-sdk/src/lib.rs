//! # Basecamp SDK
//!
//! The security boundary of a Basecamp API integration.
//!
//! This SDK provides:
//! - Webhook intake: signature verification, parsing, deduplication,
//!   middleware, and kind-based handler dispatch
//! - An API client whose GET cache is isolated per credential and whose
//!   pagination refuses `Link` targets on other origins
//! - OAuth 2.0 discovery, code exchange, and refresh over HTTPS with bounded
//!   response bodies
//! - Settings loading from files and `BASECAMP__*` environment variables
//!
//! # Examples
//!
//! ## Receiving Webhooks
//!
//! ```rust,no_run
//! use basecamp_sdk::webhook::{handler_fn, WebhookReceiver, WebhookReceiverConfig};
//! use std::collections::HashMap;
//!
//! # async fn example(body: Vec<u8>, headers: HashMap<String, String>) {
//! let receiver = WebhookReceiver::new(WebhookReceiverConfig::default().with_secret("secret"));
//!
//! receiver
//!     .on("todo_*", handler_fn(|event| {
//!         println!("todo event {} ({})", event.id, event.kind);
//!         Ok(())
//!     }))
//!     .await;
//!
//! let response = receiver.receive("POST", &body, &headers).await;
//! assert_eq!(response.status_code(), 200);
//! # }
//! ```
//!
//! ## Checking Token Expiry
//!
//! ```rust
//! use basecamp_sdk::oauth::OAuthToken;
//! use chrono::{Duration, Utc};
//!
//! let token = OAuthToken::new("access").with_expires_at(Utc::now() + Duration::seconds(30));
//!
//! // Within the default 60 second buffer
//! assert!(token.is_expired());
//! ```

// Public modules
pub mod client;
pub mod error;
pub mod oauth;
pub mod security;
pub mod settings;
pub mod transport;
pub mod webhook;

// Re-export commonly used types at crate root for convenience
pub use error::{
    ApiError, CacheError, HandlerError, OAuthError, SecurityPolicyError, SettingsError,
    ValidationError, WebhookError, WebhookVerificationError,
};

pub use client::{
    BasecampClient, ClientConfig, EtagCache, OriginGuard, StaticTokenProvider, TokenProvider,
};
pub use oauth::{is_token_expired, OAuthClient, OAuthConfig, OAuthToken, Pkce};
pub use settings::SdkSettings;
pub use webhook::{
    parse_event_kind, EventKind, KindPattern, WebhookEvent, WebhookReceiver, WebhookReceiverConfig,
};
