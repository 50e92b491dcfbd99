//! Event kind patterns used to route deliveries to handlers.

use std::fmt;

/// A pattern matched against a full event kind.
///
/// | Pattern          | Matches                                  |
/// |------------------|------------------------------------------|
/// | `*`              | every kind                               |
/// | `todo_*`         | kinds starting with `todo_`              |
/// | `*_created`      | kinds ending with `_created`             |
/// | `todo_created`   | exactly `todo_created`                   |
///
/// A `*` anywhere else is matched literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindPattern {
    Any,
    Prefix(String),
    Suffix(String),
    Exact(String),
}

impl KindPattern {
    /// Parse a pattern string.
    ///
    /// # Examples
    ///
    /// ```
    /// use basecamp_sdk::webhook::KindPattern;
    ///
    /// assert!(KindPattern::parse("todo_*").matches("todo_created"));
    /// assert!(KindPattern::parse("*_created").matches("message_created"));
    /// assert!(!KindPattern::parse("todo_created").matches("todo_completed"));
    /// ```
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Self::Any
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            Self::Suffix(suffix.to_string())
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, kind: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => kind.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => kind.ends_with(suffix.as_str()),
            Self::Exact(exact) => kind == exact,
        }
    }

    /// Dispatch tier: exact handlers run first, then globs, then catch-alls.
    pub(crate) fn tier(&self) -> u8 {
        match self {
            Self::Exact(_) => 0,
            Self::Prefix(_) | Self::Suffix(_) => 1,
            Self::Any => 2,
        }
    }
}

impl fmt::Display for KindPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{}*", prefix),
            Self::Suffix(suffix) => write!(f, "*{}", suffix),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

impl From<&str> for KindPattern {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
