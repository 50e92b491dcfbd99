//! Tests for the OAuth client.

use super::*;
use crate::error::SecurityPolicyError;
use crate::transport::{ResponseBody, TransportError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> OAuthClient {
    OAuthClient::new(OAuthConfig::default()).unwrap()
}

fn exchange_request(server: &MockServer) -> ExchangeRequest {
    ExchangeRequest {
        token_endpoint: format!("{}/authorization/token", server.uri()),
        code: "auth-code".to_string(),
        redirect_uri: "https://app.example/callback".to_string(),
        client_id: "client-id".to_string(),
        ..Default::default()
    }
}

fn token_body() -> serde_json::Value {
    json!({
        "access_token": "new-access",
        "refresh_token": "new-refresh",
        "token_type": "Bearer",
        "expires_in": 1209600
    })
}

// ============================================================================
// Fake Transport
// ============================================================================

/// Body that cannot stream and declares an arbitrary Content-Length.
struct BufferedBody {
    content_length: Option<String>,
    body: Option<Bytes>,
}

#[async_trait]
impl ResponseBody for BufferedBody {
    fn content_length(&self) -> Option<&str> {
        self.content_length.as_deref()
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.body.take())
    }
}

/// Transport that answers every request with a canned buffered body.
struct FakeTransport {
    status: u16,
    content_length: Option<String>,
    body: &'static str,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeTransport {
    fn new(status: u16, body: &'static str) -> Self {
        Self {
            status,
            content_length: None,
            body,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_content_length(mut self, value: &str) -> Self {
        self.content_length = Some(value.to_string());
        self
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(200, "")
        }
    }

    fn respond(&self) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("connection reset by peer".into());
        }
        Ok(TransportResponse {
            status: self.status,
            body: Box::new(BufferedBody {
                content_length: self.content_length.clone(),
                body: Some(Bytes::from_static(self.body.as_bytes())),
            }),
        })
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_json(&self, _url: &Url) -> Result<TransportResponse, TransportError> {
        self.respond()
    }

    async fn post_form(
        &self,
        _url: &Url,
        _form: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        self.respond()
    }
}

fn fake_client(transport: FakeTransport) -> (OAuthClient, Arc<FakeTransport>) {
    let transport = Arc::new(transport);
    let client = OAuthClient::with_transport(transport.clone(), OAuthConfig::default());
    (client, transport)
}

// ============================================================================
// Configuration Tests
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = OAuthConfig::default();

        assert_eq!(config.max_response_bytes, 1024 * 1024);
        assert_eq!(config.max_error_message_len, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_response_limit_is_rejected() {
        let result = OAuthClient::new(OAuthConfig::default().with_max_response_bytes(0));
        assert!(matches!(result, Err(OAuthError::Validation(_))));
    }
}

// ============================================================================
// Discovery Tests
// ============================================================================

mod discovery_tests {
    use super::*;

    fn metadata() -> serde_json::Value {
        json!({
            "issuer": "https://launchpad.37signals.com",
            "authorization_endpoint": "https://launchpad.37signals.com/authorization/new",
            "token_endpoint": "https://launchpad.37signals.com/authorization/token",
            "scopes_supported": ["read"]
        })
    }

    #[tokio::test]
    async fn test_discover_fetches_well_known_document() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata()))
            .expect(1)
            .mount(&server)
            .await;

        // Act
        let config = client().discover(&server.uri()).await.unwrap();

        // Assert
        assert_eq!(config.issuer, "https://launchpad.37signals.com");
        assert_eq!(
            config.token_endpoint,
            "https://launchpad.37signals.com/authorization/token"
        );
    }

    #[tokio::test]
    async fn test_trailing_slash_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata()))
            .expect(1)
            .mount(&server)
            .await;

        let result = client().discover(&format!("{}/", server.uri())).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_fields_are_reported() {
        let server = MockServer::start().await;
        Mock::given(path("/.well-known/oauth-authorization-server"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"issuer": "https://a.example"})),
            )
            .mount(&server)
            .await;

        let err = client().discover(&server.uri()).await.unwrap_err();

        match &err {
            OAuthError::MissingFields { fields } => {
                assert_eq!(fields, &vec!["authorization_endpoint", "token_endpoint"]);
            }
            other => panic!("expected missing fields, got {:?}", other),
        }
        assert!(err.to_string().contains("missing required fields"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = client().discover(&server.uri()).await.unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Not Found"));
    }

    #[tokio::test]
    async fn test_plain_http_remote_host_is_rejected() {
        let err = client().discover("http://launchpad.example").await.unwrap_err();

        assert!(matches!(
            err,
            OAuthError::Security(SecurityPolicyError::InsecureEndpoint { .. })
        ));
        assert!(err.to_string().contains("HTTPS"));
    }

    #[tokio::test]
    async fn test_malformed_document_is_a_parse_error() {
        let (client, _) = fake_client(FakeTransport::new(200, "<html>"));

        let result = client.discover("https://launchpad.example").await;

        assert!(matches!(result, Err(OAuthError::Parse { operation: "discovery", .. })));
    }
}

// ============================================================================
// Token Exchange Tests
// ============================================================================

mod exchange_tests {
    use super::*;

    #[tokio::test]
    async fn test_modern_exchange_sends_grant_type() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authorization/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("code_verifier=verifier-value"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;
        let request = ExchangeRequest {
            code_verifier: Some("verifier-value".to_string()),
            ..exchange_request(&server)
        };

        // Act
        let token = client().exchange_code(&request).await.unwrap();

        // Assert
        assert_eq!(token.access_token, "new-access");
        assert_eq!(token.refresh_token.as_deref(), Some("new-refresh"));
        assert!(token.expires_at.is_some());
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_legacy_exchange_sends_type_web_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("type=web_server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;
        let request = ExchangeRequest {
            use_legacy_format: true,
            ..exchange_request(&server)
        };

        let result = client().exchange_code(&request).await;

        assert!(result.is_ok());
        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).into_owned();
        assert!(!body.contains("grant_type"));
    }

    #[tokio::test]
    async fn test_missing_code_fails_before_any_request() {
        let (client, transport) = fake_client(FakeTransport::new(200, "{}"));
        let request = ExchangeRequest {
            token_endpoint: "https://launchpad.example/token".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
            client_id: "client-id".to_string(),
            ..Default::default()
        };

        let result = client.exchange_code(&request).await;

        assert!(matches!(
            result,
            Err(OAuthError::Validation(ValidationError::Required { ref field })) if field == "code"
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plain_http_token_endpoint_is_rejected() {
        let (client, transport) = fake_client(FakeTransport::new(200, "{}"));
        let request = ExchangeRequest {
            token_endpoint: "http://launchpad.example/token".to_string(),
            code: "c".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
            client_id: "id".to_string(),
            ..Default::default()
        };

        let err = client.exchange_code(&request).await.unwrap_err();

        assert!(err.to_string().contains("HTTPS"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_localhost_http_is_allowed() {
        let (client, _) = fake_client(FakeTransport::new(200, r#"{"access_token":"a"}"#));
        let request = ExchangeRequest {
            token_endpoint: "http://localhost:3000/token".to_string(),
            code: "c".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            client_id: "id".to_string(),
            ..Default::default()
        };

        let token = client.exchange_code(&request).await.unwrap();

        assert_eq!(token.access_token, "a");
        assert!(token.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_error_document_becomes_token_rejected() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "d".repeat(2000)
            })))
            .mount(&server)
            .await;

        // Act
        let err = client()
            .exchange_code(&exchange_request(&server))
            .await
            .unwrap_err();

        // Assert
        match err {
            OAuthError::TokenRejected { code, description } => {
                assert_eq!(code, "invalid_grant");
                let description = description.unwrap();
                assert_eq!(description.len(), 500);
                assert!(description.ends_with("..."));
            }
            other => panic!("expected token rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_error_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let err = client()
            .exchange_code(&exchange_request(&server))
            .await
            .unwrap_err();

        match err {
            OAuthError::Http { status, body, .. } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), 500);
                assert!(body.ends_with("..."));
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_failure_is_reported() {
        let (client, _) = fake_client(FakeTransport::failing());

        let err = client
            .refresh_token(&RefreshRequest {
                token_endpoint: "https://launchpad.example/token".to_string(),
                refresh_token: "r".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OAuthError::Network { operation: "token refresh", .. }));
        assert!(err.to_string().contains("connection reset"));
    }
}

// ============================================================================
// Token Refresh Tests
// ============================================================================

mod refresh_tests {
    use super::*;

    #[tokio::test]
    async fn test_modern_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authorization/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let token = client()
            .refresh_token(&RefreshRequest {
                token_endpoint: format!("{}/authorization/token", server.uri()),
                refresh_token: "old-refresh".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(token.access_token, "new-access");
    }

    #[tokio::test]
    async fn test_legacy_refresh_sends_type_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("type=refresh"))
            .and(body_string_contains("client_id=client-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .refresh_token(&RefreshRequest {
                token_endpoint: format!("{}/authorization/token", server.uri()),
                refresh_token: "old-refresh".to_string(),
                client_id: Some("client-id".to_string()),
                use_legacy_format: true,
                ..Default::default()
            })
            .await;

        assert!(result.is_ok());
    }
}

// ============================================================================
// Response Size Tests
// ============================================================================

mod response_size_tests {
    use super::*;

    #[tokio::test]
    async fn test_oversized_streamed_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(2048)))
            .mount(&server)
            .await;
        let client = OAuthClient::new(OAuthConfig::default().with_max_response_bytes(1024)).unwrap();

        let err = client
            .exchange_code(&exchange_request(&server))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OAuthError::Security(SecurityPolicyError::ResponseTooLarge { limit: 1024 })
        ));
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_declared_length_above_limit_is_rejected() {
        let (client, _) =
            fake_client(FakeTransport::new(200, "{}").with_content_length("999999999"));

        let err = client.discover("https://launchpad.example").await.unwrap_err();

        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_non_numeric_content_length_without_streaming_fails_closed() {
        let (client, _) = fake_client(
            FakeTransport::new(200, r#"{"access_token":"a"}"#).with_content_length("lots"),
        );

        let err = client
            .refresh_token(&RefreshRequest {
                token_endpoint: "https://launchpad.example/token".to_string(),
                refresh_token: "r".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OAuthError::Security(SecurityPolicyError::InvalidContentLength { .. })
        ));
        assert!(err.to_string().contains("no valid Content-Length"));
    }
}
