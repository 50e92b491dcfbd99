//! Request-safety primitives shared by the API client and the OAuth service.
//!
//! - [`Origin`] and [`is_same_origin`] compare scheme, host, and effective port
//! - [`require_secure_endpoint`] enforces HTTPS with a loopback escape hatch
//! - [`truncate_message`] bounds server-supplied text embedded in errors
//! - [`redact_headers`] scrubs credentials before headers reach a log line

use reqwest::header::{HeaderMap, HeaderValue};
use std::fmt;
use url::{Host, Url};

use crate::error::SecurityPolicyError;

/// Maximum size of a successful API response body (50 MiB).
pub const MAX_RESPONSE_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum size of an error response body read for diagnostics (1 MiB).
pub const MAX_ERROR_BODY_BYTES: u64 = 1024 * 1024;

/// Maximum length of server-supplied text embedded in an error message.
pub const MAX_ERROR_MESSAGE_BYTES: usize = 500;

/// Headers whose values must never be logged.
const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "set-cookie", "x-csrf-token"];

/// The unit of same-origin comparison: scheme, host, and effective port.
///
/// Default ports are normalized, so `https://example.com` and
/// `https://example.com:443` are the same origin.
///
/// # Examples
///
/// ```
/// use basecamp_sdk::security::Origin;
///
/// let a = Origin::parse("https://3.basecampapi.com/999/projects.json").unwrap();
/// let b = Origin::parse("https://3.basecampapi.com:443/999/people.json").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "https://3.basecampapi.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// Derive the origin of an absolute URL.
    ///
    /// Returns `None` for URLs without a host (e.g. `data:` or `mailto:`).
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        Some(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host,
            port: url.port_or_known_default(),
        })
    }

    /// Parse a URL string and derive its origin.
    pub fn parse(raw: &str) -> Result<Self, SecurityPolicyError> {
        let url = parse_url(raw)?;
        Self::from_url(&url).ok_or_else(|| SecurityPolicyError::InvalidUrl {
            url: truncate_message(raw, 200),
            message: "URL has no host".to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Effective port: explicit port, or the scheme's default.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    fn default_port(&self) -> Option<u16> {
        match self.scheme.as_str() {
            "https" => Some(443),
            "http" => Some(80),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        match self.port {
            Some(port) if Some(port) != self.default_port() => write!(f, ":{}", port),
            _ => Ok(()),
        }
    }
}

/// Check whether two absolute URLs share scheme, host, and effective port.
///
/// URLs without a host never match anything.
pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    match (Origin::from_url(a), Origin::from_url(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Resolve a possibly-relative reference against a base URL.
///
/// Absolute targets are returned unchanged.
pub fn resolve_url(base: &Url, target: &str) -> Result<Url, SecurityPolicyError> {
    base.join(target.trim())
        .map_err(|e| SecurityPolicyError::InvalidUrl {
            url: truncate_message(target, 200),
            message: e.to_string(),
        })
}

/// Check whether a URL points at the local machine.
///
/// Recognizes `localhost`, any `*.localhost` name (RFC 6761), `127.0.0.1`,
/// and the IPv6 loopback address.
pub fn is_localhost(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip == std::net::Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Validate that an endpoint which will receive credentials is secure.
///
/// Secure means `https://`, or a loopback host, which is trusted for local
/// development against mock servers.
///
/// # Examples
///
/// ```
/// use basecamp_sdk::security::require_secure_endpoint;
///
/// assert!(require_secure_endpoint("https://launchpad.37signals.com/authorization/token").is_ok());
/// assert!(require_secure_endpoint("http://localhost:8080/token").is_ok());
/// assert!(require_secure_endpoint("http://example.com/token").is_err());
/// ```
pub fn require_secure_endpoint(raw: &str) -> Result<Url, SecurityPolicyError> {
    let url = parse_url(raw)?;
    if url.scheme() == "https" || is_localhost(&url) {
        Ok(url)
    } else {
        Err(SecurityPolicyError::InsecureEndpoint {
            url: truncate_message(raw, 200),
        })
    }
}

/// Truncate `s` to at most `max_len` bytes, appending `...` when cut.
///
/// The cut always lands on a character boundary, so the result may be a few
/// bytes shorter than `max_len`.
pub fn truncate_message(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let (budget, suffix) = if max_len <= 3 {
        (max_len, "")
    } else {
        (max_len - 3, "...")
    };

    let mut end = budget;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}{}", &s[..end], suffix)
}

/// Copy `headers`, replacing credential-bearing values with `[REDACTED]`.
///
/// Redacted headers: `Authorization`, `Cookie`, `Set-Cookie`, `X-CSRF-Token`.
pub fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut redacted = headers.clone();
    for name in SENSITIVE_HEADERS {
        if redacted.contains_key(name) {
            redacted.insert(name, HeaderValue::from_static("[REDACTED]"));
        }
    }
    redacted
}

/// Redirect policy that refuses to carry a request to another origin.
///
/// Pagination and API calls carry bearer tokens, so a redirect that changes
/// origin is treated as a policy violation rather than silently followed.
pub fn same_origin_redirect_policy(max_redirects: usize) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("too many redirects (limit {})", max_redirects));
        }

        let same_origin = attempt
            .previous()
            .first()
            .map(|original| is_same_origin(original, attempt.url()))
            .unwrap_or(true);

        if same_origin {
            attempt.follow()
        } else {
            let url = attempt.url().to_string();
            attempt.error(SecurityPolicyError::CrossOriginRedirect { url })
        }
    })
}

fn parse_url(raw: &str) -> Result<Url, SecurityPolicyError> {
    Url::parse(raw).map_err(|e| SecurityPolicyError::InvalidUrl {
        url: truncate_message(raw, 200),
        message: e.to_string(),
    })
}

#[cfg(test)]
#[path = "security_tests.rs"]
mod tests;
