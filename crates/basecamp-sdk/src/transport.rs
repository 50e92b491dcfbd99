//! HTTP transport seam and size-bounded body reading.
//!
//! Every response body the SDK consumes goes through [`read_limited`], which
//! enforces a byte ceiling before and while reading. The OAuth service talks
//! to the network through the [`HttpTransport`] trait so tests and embedders
//! can substitute their own client.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{ACCEPT, CONTENT_LENGTH};
use std::time::Duration;
use url::Url;

use crate::error::SecurityPolicyError;
use crate::security::{same_origin_redirect_policy, truncate_message};

/// Error raised by a transport or body implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// A response body that may or may not support incremental reads.
#[async_trait]
pub trait ResponseBody: Send {
    /// Raw `Content-Length` header value, if the response declared one.
    fn content_length(&self) -> Option<&str>;

    /// Whether [`next_chunk`](Self::next_chunk) yields the body incrementally.
    ///
    /// A body that cannot stream is read in one piece, so its ceiling can only
    /// be enforced up front from a trustworthy declared length.
    fn supports_streaming(&self) -> bool;

    /// Read the next chunk, or `None` at end of body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Read the remainder of the body in one piece.
    async fn read_all(&mut self) -> Result<Bytes, TransportError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

/// Failure while reading a bounded body.
#[derive(Debug)]
pub enum BodyReadError {
    /// The ceiling was exceeded, or the body could not be bounded at all.
    Policy(SecurityPolicyError),
    /// The underlying connection failed.
    Transport(TransportError),
}

/// Read `body` into memory, failing if it exceeds `limit` bytes.
///
/// - A declared length above `limit` fails before any byte is read.
/// - A streaming body is counted chunk by chunk and abandoned as soon as the
///   running total passes `limit`.
/// - A non-streaming body with a malformed declared length fails closed,
///   because nothing else could bound it before it is fully buffered.
pub async fn read_limited<B>(body: &mut B, limit: u64) -> Result<Bytes, BodyReadError>
where
    B: ResponseBody + ?Sized,
{
    let too_large = || BodyReadError::Policy(SecurityPolicyError::ResponseTooLarge { limit });

    let declared = match body.content_length() {
        None => None,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(length) => Some(length),
            Err(_) if body.supports_streaming() => None,
            Err(_) => {
                return Err(BodyReadError::Policy(
                    SecurityPolicyError::InvalidContentLength {
                        value: truncate_message(raw, 64),
                    },
                ))
            }
        },
    };

    if declared.is_some_and(|length| length > limit) {
        return Err(too_large());
    }

    if body.supports_streaming() {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body
            .next_chunk()
            .await
            .map_err(BodyReadError::Transport)?
        {
            if (buffer.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    } else {
        let bytes = body.read_all().await.map_err(BodyReadError::Transport)?;
        if bytes.len() as u64 > limit {
            return Err(too_large());
        }
        Ok(bytes)
    }
}

/// Streaming body backed by a `reqwest` response.
pub struct ReqwestBody {
    response: reqwest::Response,
    content_length: Option<String>,
}

impl ReqwestBody {
    pub fn new(response: reqwest::Response) -> Self {
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
        Self {
            response,
            content_length,
        }
    }
}

#[async_trait]
impl ResponseBody for ReqwestBody {
    fn content_length(&self) -> Option<&str> {
        self.content_length.as_deref()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.response.chunk().await?)
    }
}

/// Status and body of a transport response.
pub struct TransportResponse {
    pub status: u16,
    pub body: Box<dyn ResponseBody>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.body.content_length())
            .finish()
    }
}

/// Minimal HTTP surface needed by the OAuth service.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a GET request accepting JSON.
    async fn get_json(&self, url: &Url) -> Result<TransportResponse, TransportError>;

    /// Send a POST with an `application/x-www-form-urlencoded` body.
    async fn post_form(
        &self,
        url: &Url,
        form: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`.
///
/// Redirects are followed only within the original origin.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(same_origin_redirect_policy(10))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client. The caller owns its redirect policy.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Ok(TransportResponse {
            status: response.status().as_u16(),
            body: Box::new(ReqwestBody::new(response)),
        })
    }

    async fn post_form(
        &self,
        url: &Url,
        form: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;
        Ok(TransportResponse {
            status: response.status().as_u16(),
            body: Box::new(ReqwestBody::new(response)),
        })
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
