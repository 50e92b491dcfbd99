//! Link-header pagination and the origin guard that makes it safe to follow.
//!
//! Basecamp paginates collection endpoints with RFC 8288 `Link` headers. The
//! link target comes from the server response, so before the client follows
//! it with credentials attached, [`OriginGuard`] checks that it stays on the
//! origin the caller asked for.

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::SecurityPolicyError;
use crate::security::{resolve_url, Origin};

/// Link targets extracted from a `Link` header, unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl Links {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.prev.is_some()
    }
}

/// Parse a `Link` header into its `next`, `prev`, `first`, and `last` targets.
///
/// Relation names are matched case-insensitively, quoted or bare, and a link
/// with several relations (`rel="next last"`) fills each of them. Entries that
/// are not `<target>; params` are skipped.
///
/// # Examples
///
/// ```
/// use basecamp_sdk::client::parse_link_header;
///
/// let links = parse_link_header(Some(
///     r#"<https://3.basecampapi.com/999/projects.json?page=2>; rel="next""#,
/// ));
/// assert_eq!(
///     links.next.as_deref(),
///     Some("https://3.basecampapi.com/999/projects.json?page=2")
/// );
/// assert!(links.prev.is_none());
/// ```
pub fn parse_link_header(link_header: Option<&str>) -> Links {
    let mut links = Links::default();

    let Some(header) = link_header else {
        return links;
    };

    for entry in header.split(',') {
        let mut parts = entry.split(';');
        let target = match parts.next().map(str::trim) {
            Some(t) if t.starts_with('<') && t.ends_with('>') && t.len() >= 2 => &t[1..t.len() - 1],
            _ => continue,
        };

        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("rel") {
                continue;
            }

            for rel in value.trim().trim_matches('"').split_whitespace() {
                let slot = match rel.to_ascii_lowercase().as_str() {
                    "next" => &mut links.next,
                    "prev" | "previous" => &mut links.prev,
                    "first" => &mut links.first,
                    "last" => &mut links.last,
                    _ => continue,
                };
                if slot.is_none() {
                    *slot = Some(target.to_string());
                }
            }
        }
    }

    links
}

/// Validates pagination links against the origin of the original request.
///
/// Links are resolved against the page they appeared on, so relative links
/// follow the most recent hop. The resolved URL is accepted only if its
/// scheme, host, and effective port match the original request or one of the
/// explicitly allowed origins.
///
/// # Examples
///
/// ```
/// use basecamp_sdk::client::OriginGuard;
/// use url::Url;
///
/// let first = Url::parse("https://3.basecampapi.com/999/projects.json").unwrap();
/// let guard = OriginGuard::new(&first).unwrap();
///
/// let next = guard.next_page(&first, "/999/projects.json?page=2").unwrap();
/// assert_eq!(next.as_str(), "https://3.basecampapi.com/999/projects.json?page=2");
///
/// let err = guard.next_page(&first, "https://evil.example/steal").unwrap_err();
/// assert!(err.to_string().contains("different origin"));
/// ```
#[derive(Debug, Clone)]
pub struct OriginGuard {
    origin: Origin,
    allowed: Vec<Origin>,
}

impl OriginGuard {
    /// Create a guard pinned to the origin of `request_url`.
    pub fn new(request_url: &Url) -> Result<Self, SecurityPolicyError> {
        let origin = Origin::from_url(request_url).ok_or_else(|| SecurityPolicyError::InvalidUrl {
            url: request_url.to_string(),
            message: "URL has no host".to_string(),
        })?;
        Ok(Self {
            origin,
            allowed: Vec::new(),
        })
    }

    /// Also accept links to `origin`.
    pub fn allow_origin(mut self, origin: Origin) -> Self {
        if origin != self.origin && !self.allowed.contains(&origin) {
            self.allowed.push(origin);
        }
        self
    }

    pub fn with_allowed_origins(self, origins: impl IntoIterator<Item = Origin>) -> Self {
        origins.into_iter().fold(self, Self::allow_origin)
    }

    /// The origin of the original request.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Check whether `url` is on an accepted origin.
    pub fn permits(&self, url: &Url) -> bool {
        match Origin::from_url(url) {
            Some(candidate) => candidate == self.origin || self.allowed.contains(&candidate),
            None => false,
        }
    }

    /// Resolve `link` against `current_page` and validate the result.
    ///
    /// # Errors
    ///
    /// [`SecurityPolicyError::CrossOriginLink`] when the resolved link leaves
    /// the accepted origins; [`SecurityPolicyError::InvalidUrl`] when it cannot
    /// be resolved at all.
    pub fn next_page(&self, current_page: &Url, link: &str) -> Result<Url, SecurityPolicyError> {
        let resolved = resolve_url(current_page, link)?;

        if self.permits(&resolved) {
            Ok(resolved)
        } else {
            warn!(
                origin = %self.origin,
                rejected = %Origin::from_url(&resolved).map(|o| o.to_string()).unwrap_or_default(),
                "Pagination link points to a different origin"
            );
            Err(SecurityPolicyError::CrossOriginLink {
                url: resolved.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod tests;
