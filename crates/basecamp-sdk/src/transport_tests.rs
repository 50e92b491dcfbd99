//! Tests for size-bounded body reading.

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Fake Bodies
// ============================================================================

/// Body that hands out pre-baked chunks and counts how many were pulled.
struct FakeBody {
    content_length: Option<String>,
    streaming: bool,
    chunks: VecDeque<Bytes>,
    pulled: Arc<AtomicUsize>,
}

impl FakeBody {
    fn streaming(chunks: &[&[u8]]) -> Self {
        Self {
            content_length: None,
            streaming: true,
            chunks: chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect(),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn buffered(body: &[u8]) -> Self {
        Self {
            streaming: false,
            ..Self::streaming(&[body])
        }
    }

    fn with_content_length(mut self, value: &str) -> Self {
        self.content_length = Some(value.to_string());
        self
    }
}

#[async_trait]
impl ResponseBody for FakeBody {
    fn content_length(&self) -> Option<&str> {
        self.content_length.as_deref()
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.pulled.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.pop_front())
    }
}

struct FailingBody;

#[async_trait]
impl ResponseBody for FailingBody {
    fn content_length(&self) -> Option<&str> {
        None
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Err("connection reset".into())
    }
}

fn assert_too_large(result: Result<Bytes, BodyReadError>, expected_limit: u64) {
    match result {
        Err(BodyReadError::Policy(SecurityPolicyError::ResponseTooLarge { limit })) => {
            assert_eq!(limit, expected_limit)
        }
        other => panic!("expected ResponseTooLarge, got {:?}", other),
    }
}

// ============================================================================
// Declared Length Tests
// ============================================================================

mod declared_length_tests {
    use super::*;

    #[tokio::test]
    async fn test_oversized_declared_length_fails_before_reading() {
        // Arrange
        let mut body = FakeBody::streaming(&[b"small"]).with_content_length("2048");
        let pulled = body.pulled.clone();

        // Act
        let result = read_limited(&mut body, 1024).await;

        // Assert
        assert_too_large(result, 1024);
        assert_eq!(pulled.load(Ordering::SeqCst), 0, "no chunk should be read");
    }

    #[tokio::test]
    async fn test_declared_length_within_limit_reads_body() {
        let mut body = FakeBody::streaming(&[b"hello ", b"world"]).with_content_length("11");

        let bytes = read_limited(&mut body, 1024).await.unwrap();

        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn test_malformed_length_on_streaming_body_falls_back_to_counting() {
        let mut body = FakeBody::streaming(&[b"hello"]).with_content_length("abc");

        let bytes = read_limited(&mut body, 1024).await.unwrap();

        assert_eq!(&bytes[..], b"hello");
    }
}

// ============================================================================
// Streaming Tests
// ============================================================================

mod streaming_tests {
    use super::*;

    #[tokio::test]
    async fn test_undeclared_oversized_body_stops_at_limit() {
        // Arrange: four 512-byte chunks against a 1 KiB ceiling
        let chunk = [b'x'; 512];
        let mut body = FakeBody::streaming(&[&chunk, &chunk, &chunk, &chunk]);
        let pulled = body.pulled.clone();

        // Act
        let result = read_limited(&mut body, 1024).await;

        // Assert: the third chunk trips the ceiling, the fourth is never pulled
        assert_too_large(result, 1024);
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_body_exactly_at_limit_is_accepted() {
        let chunk = [b'x'; 512];
        let mut body = FakeBody::streaming(&[&chunk, &chunk]);

        let bytes = read_limited(&mut body, 1024).await.unwrap();

        assert_eq!(bytes.len(), 1024);
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_as_transport_error() {
        let result = read_limited(&mut FailingBody, 1024).await;

        match result {
            Err(BodyReadError::Transport(e)) => assert_eq!(e.to_string(), "connection reset"),
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}

// ============================================================================
// Non-Streaming Tests
// ============================================================================

mod buffered_tests {
    use super::*;

    #[tokio::test]
    async fn test_negative_length_fails_closed() {
        let mut body = FakeBody::buffered(b"{}").with_content_length("-5");

        let result = read_limited(&mut body, 1024).await;

        match result {
            Err(BodyReadError::Policy(err @ SecurityPolicyError::InvalidContentLength { .. })) => {
                assert!(err.to_string().contains("no valid Content-Length"));
                assert!(err.to_string().contains("-5"));
            }
            other => panic!("expected InvalidContentLength, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_numeric_length_fails_closed() {
        let mut body = FakeBody::buffered(b"{}").with_content_length("abc");
        let pulled = body.pulled.clone();

        let result = read_limited(&mut body, 1024).await;

        assert!(matches!(
            result,
            Err(BodyReadError::Policy(SecurityPolicyError::InvalidContentLength { .. }))
        ));
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_length_reads_whole_body() {
        let mut body = FakeBody::buffered(b"{\"ok\":true}").with_content_length("11");

        let bytes = read_limited(&mut body, 1024).await.unwrap();

        assert_eq!(&bytes[..], b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_undeclared_body_is_checked_after_read() {
        let mut body = FakeBody::buffered(&[b'x'; 2048]);

        let result = read_limited(&mut body, 1024).await;

        assert_too_large(result, 1024);
    }
}
