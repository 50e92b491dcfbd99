//! Basecamp API client.
//!
//! [`BasecampClient`] is the shared request path for API calls. Every request
//! it sends is authenticated through a [`TokenProvider`], bounded in size, and
//! refused if a redirect would carry it to another origin. GET requests use
//! the credential-isolated [`EtagCache`] for conditional requests, and
//! [`BasecampClient::get_all`] follows `Link` pagination through an
//! [`OriginGuard`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use basecamp_sdk::client::{BasecampClient, ClientConfig, StaticTokenProvider};
//!
//! # async fn example() -> Result<(), basecamp_sdk::error::ApiError> {
//! let client = BasecampClient::builder(StaticTokenProvider::new("access-token"))
//!     .config(ClientConfig::default().with_base_url("https://3.basecampapi.com/999999999"))
//!     .build()?;
//!
//! let projects = client.get_all("/projects.json").await?;
//! println!("{} projects", projects.len());
//! # Ok(())
//! # }
//! ```

mod cache;
mod disk;
mod pagination;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, LINK};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, ValidationError};
use crate::security::{
    require_secure_endpoint, same_origin_redirect_policy, truncate_message, Origin,
    MAX_ERROR_BODY_BYTES, MAX_ERROR_MESSAGE_BYTES, MAX_RESPONSE_BODY_BYTES,
};
use crate::transport::{read_limited, BodyReadError, ReqwestBody};

pub use cache::{
    credential_fingerprint, CacheKey, CachedResponse, ClientIdentity, CredentialFingerprint,
    EtagCache, DEFAULT_CACHE_CAPACITY,
};
pub use disk::DiskStore;
pub use pagination::{parse_link_header, Links, OriginGuard};

/// Default cap on pages fetched by [`BasecampClient::get_all`].
pub const DEFAULT_MAX_PAGES: usize = 10_000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for [`BasecampClient`] behavior.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined onto.
    pub base_url: String,

    /// User agent string for API requests.
    pub user_agent: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum number of pages followed by `get_all`.
    pub max_pages: usize,

    /// Ceiling on a successful response body, in bytes.
    pub max_response_bytes: u64,

    /// Maximum number of same-origin redirects followed.
    pub max_redirects: usize,

    /// Whether GET responses are cached by ETag.
    pub cache_enabled: bool,

    /// Number of responses the cache holds in memory.
    pub cache_capacity: usize,

    /// Directory the cache persists responses in; memory only when `None`.
    pub cache_dir: Option<PathBuf>,

    /// Extra origins pagination links may point at.
    pub allowed_origins: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://3.basecampapi.com".to_string(),
            user_agent: format!("basecamp-sdk-rust/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
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

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_response_bytes(mut self, max_response_bytes: u64) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Check that the configuration can produce a working client.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_secure_endpoint(&self.base_url).map_err(|e| ValidationError::InvalidFormat {
            field: "base_url".to_string(),
            message: e.to_string(),
        })?;

        if self.max_pages == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_pages".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_response_bytes == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_response_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: "timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        for origin in &self.allowed_origins {
            Origin::parse(origin).map_err(|e| ValidationError::InvalidFormat {
                field: "allowed_origins".to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    pub fn max_response_bytes(mut self, max_response_bytes: u64) -> Self {
        self.config.max_response_bytes = max_response_bytes;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.allowed_origins.push(origin.into());
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Token Provider
// ============================================================================

/// Supplies the bearer token for API requests.
///
/// Called once per request, so implementations can refresh tokens
/// transparently.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// A fixed access token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.token.clone())
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Response
// ============================================================================

/// A fully buffered API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Status as received; `304` when the body came from the cache.
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL after same-origin redirects.
    pub url: Url,
    pub from_cache: bool,
}

impl ApiResponse {
    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated Basecamp API client.
///
/// Cheap to clone; clones share the HTTP connection pool, the cache, and the
/// client identity.
#[derive(Clone)]
pub struct BasecampClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    identity: ClientIdentity,
    tokens: Arc<dyn TokenProvider>,
    http_client: reqwest::Client,
    config: ClientConfig,
    base_url: Url,
    allowed_origins: Vec<Origin>,
    cache: Option<Arc<EtagCache>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.forget_client(self.identity) {
                warn!(error = %e, "Failed to release client cache identity");
            }
        }
    }
}

impl BasecampClient {
    /// Create a builder for a client authenticated by `tokens`.
    pub fn builder(tokens: impl TokenProvider + 'static) -> BasecampClientBuilder {
        BasecampClientBuilder::new(Arc::new(tokens))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> ClientIdentity {
        self.inner.identity
    }

    pub fn cache(&self) -> Option<&Arc<EtagCache>> {
        self.inner.cache.as_ref()
    }

    /// Resolve a request path against the base URL.
    ///
    /// Absolute URLs are accepted only when they are HTTPS (or loopback).
    pub fn build_url(&self, path: &str) -> Result<Url, ApiError> {
        if path.starts_with("https://") || path.starts_with("http://") {
            return Ok(require_secure_endpoint(path)?);
        }

        let joined = format!(
            "{}/{}",
            self.inner.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| ApiError::InvalidRequest {
            message: format!("invalid request path {}: {}", truncate_message(path, 200), e),
        })
    }

    /// Send a request to `path` with an optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.build_url(path)?;
        self.send(method, url, body).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(&body)).await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(&body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Fetch every page of a collection.
    pub async fn get_all(&self, path: &str) -> Result<Vec<serde_json::Value>, ApiError> {
        self.get_all_with_limit(path, 0).await
    }

    /// Fetch pages of a collection until `limit` items are collected.
    ///
    /// A `limit` of 0 means no item limit. Pagination always stops after
    /// `max_pages` pages. Each `Link: rel="next"` target is resolved against
    /// the page it came from and must stay on the origin of the first request
    /// (or a configured allowed origin); otherwise the call fails before the
    /// link is requested.
    pub async fn get_all_with_limit(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, ApiError> {
        let first = self.build_url(path)?;
        let guard = OriginGuard::new(&first)?
            .with_allowed_origins(self.inner.allowed_origins.iter().cloned());

        let mut current = first;
        let mut items = Vec::new();

        for page in 1..=self.inner.config.max_pages {
            let response = self.send(Method::GET, current.clone(), None).await?;
            let page_items: Vec<serde_json::Value> = response.json()?;
            items.extend(page_items);

            if limit > 0 && items.len() >= limit {
                items.truncate(limit);
                return Ok(items);
            }

            let links = parse_link_header(response.header(LINK.as_str()));
            let Some(next) = links.next else {
                debug!(pages = page, items = items.len(), "Pagination complete");
                return Ok(items);
            };

            current = guard.next_page(&response.url, &next)?;
        }

        warn!(
            max_pages = self.inner.config.max_pages,
            items = items.len(),
            "Pagination stopped at page limit"
        );
        Ok(items)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let headers = self.authorization_headers().await?;

        let cache = if method == Method::GET {
            self.inner.cache.as_deref()
        } else {
            None
        };
        let cache_key = cache.and_then(|cache| self.cache_key(cache, &method, &url, &headers));

        let mut request = self
            .inner
            .http_client
            .request(method.clone(), url.clone())
            .headers(headers)
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        if let (Some(cache), Some(key)) = (cache, &cache_key) {
            match cache.etag(key) {
                Ok(Some(etag)) => request = request.header(IF_NONE_MATCH, etag),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ETag cache lookup failed"),
            }
        }

        debug!(method = %method, url = %url, "Sending API request");
        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        let response_headers = response.headers().clone();
        debug!(method = %method, url = %url, status = status.as_u16(), "API response received");

        if status == StatusCode::NOT_MODIFIED {
            let cached = match (cache, &cache_key) {
                (Some(cache), Some(key)) => cache.get(key).unwrap_or_else(|e| {
                    warn!(error = %e, "ETag cache read failed");
                    None
                }),
                _ => None,
            };
            return match cached {
                Some(cached) => Ok(ApiResponse {
                    status: status.as_u16(),
                    headers: response_headers,
                    body: cached.body,
                    url: final_url,
                    from_cache: true,
                }),
                None => Err(ApiError::NotModifiedWithoutCache),
            };
        }

        if !status.is_success() {
            let mut body = ReqwestBody::new(response);
            let detail = match read_limited(&mut body, MAX_ERROR_BODY_BYTES).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => String::new(),
            };
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: truncate_message(detail.trim(), MAX_ERROR_MESSAGE_BYTES),
            });
        }

        // No Content reads as JSON `null`.
        if status == StatusCode::NO_CONTENT {
            return Ok(ApiResponse {
                status: status.as_u16(),
                headers: response_headers,
                body: Bytes::from_static(b"null"),
                url: final_url,
                from_cache: false,
            });
        }

        let mut body = ReqwestBody::new(response);
        let bytes = read_limited(&mut body, self.inner.config.max_response_bytes)
            .await
            .map_err(body_read_error)?;

        if let (Some(cache), Some(key)) = (cache, cache_key) {
            if let Some(etag) = response_headers.get(ETAG).and_then(|v| v.to_str().ok()) {
                let cached = CachedResponse {
                    etag: etag.to_string(),
                    body: bytes.clone(),
                };
                if let Err(e) = cache.store(key, &url, cached) {
                    warn!(error = %e, "ETag cache store failed");
                }
            }
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            headers: response_headers,
            body: bytes,
            url: final_url,
            from_cache: false,
        })
    }

    async fn authorization_headers(&self) -> Result<HeaderMap, ApiError> {
        let token = self.inner.tokens.access_token().await?;

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            ApiError::Authentication {
                message: "access token contains characters not allowed in a header".to_string(),
            }
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn cache_key(
        &self,
        cache: &EtagCache,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Option<CacheKey> {
        match cache.fingerprint_for(Some(self.inner.identity), headers) {
            Ok(fingerprint) => Some(CacheKey::new(method, url, &fingerprint)),
            Err(e) => {
                warn!(error = %e, "Credential fingerprint lookup failed; skipping cache");
                None
            }
        }
    }
}

impl std::fmt::Debug for BasecampClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasecampClient")
            .field("config", &self.inner.config)
            .field("identity", &self.inner.identity)
            .field("tokens", &"<TokenProvider>")
            .finish()
    }
}

fn open_cache(config: &ClientConfig) -> Result<EtagCache, ApiError> {
    match &config.cache_dir {
        Some(dir) => EtagCache::persistent(config.cache_capacity, dir).map_err(|e| {
            ApiError::Configuration {
                message: format!("Failed to open response cache: {}", e),
            }
        }),
        None => Ok(EtagCache::new(config.cache_capacity)),
    }
}

fn body_read_error(err: BodyReadError) -> ApiError {
    match err {
        BodyReadError::Policy(e) => ApiError::Security(e),
        BodyReadError::Transport(e) => ApiError::BodyRead {
            message: e.to_string(),
        },
    }
}

/// Builder for [`BasecampClient`].
pub struct BasecampClientBuilder {
    tokens: Arc<dyn TokenProvider>,
    config: Option<ClientConfig>,
    cache: Option<Arc<EtagCache>>,
}

impl BasecampClientBuilder {
    fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            tokens,
            config: None,
            cache: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a cache shared with other clients instead of a private one.
    pub fn cache(mut self, cache: Arc<EtagCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<BasecampClient, ApiError> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(|e| ApiError::Configuration {
            message: e.to_string(),
        })?;

        let base_url = require_secure_endpoint(&config.base_url)?;
        let allowed_origins = config
            .allowed_origins
            .iter()
            .map(|o| Origin::parse(o))
            .collect::<Result<Vec<_>, _>>()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(same_origin_redirect_policy(config.max_redirects))
            .build()
            .map_err(|e| ApiError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let cache = match (self.cache, config.cache_enabled) {
            (Some(cache), true) => Some(cache),
            (None, true) => Some(Arc::new(open_cache(&config)?)),
            (_, false) => None,
        };

        Ok(BasecampClient {
            inner: Arc::new(ClientInner {
                identity: ClientIdentity::next(),
                tokens: self.tokens,
                http_client,
                config,
                base_url,
                allowed_origins,
                cache,
            }),
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
