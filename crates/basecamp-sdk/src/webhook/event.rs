//! Webhook event payloads and event kind parsing.
//!
//! Basecamp delivers one JSON document per webhook. The envelope carries an
//! identifier, a kind such as `todo_created`, and the recording the event is
//! about. Every field past `id` and `kind` is optional, and unknown fields are
//! ignored so that new server-side attributes never break intake.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Recording type names as they appear in `kind` and `recording.type`.
pub mod recording_types {
    pub const CHECKIN_REPLY: &str = "Checkin::Reply";
    pub const CLOUD_FILE: &str = "CloudFile";
    pub const COMMENT: &str = "Comment";
    pub const DOCUMENT: &str = "Document";
    pub const FORWARD_REPLY: &str = "Forward::Reply";
    pub const GOOGLE_DOCUMENT: &str = "GoogleDocument";
    pub const INBOX_FORWARD: &str = "Inbox::Forward";
    pub const MESSAGE: &str = "Message";
    pub const QUESTION: &str = "Question";
    pub const QUESTION_ANSWER: &str = "Question::Answer";
    pub const SCHEDULE_ENTRY: &str = "Schedule::Entry";
    pub const TODO: &str = "Todo";
    pub const TODOLIST: &str = "Todolist";
    pub const TODOLIST_GROUP: &str = "Todolist::Group";
    pub const UPLOAD: &str = "Upload";
    pub const VAULT: &str = "Vault";
}

// ============================================================================
// Event Identifier
// ============================================================================

/// Opaque webhook event identifier.
///
/// The wire format sends a JSON integer, but identifiers are compared and
/// stored as decimal strings so that values above 2^53 survive intact. String
/// identifiers are accepted as-is. Fractional numbers are rejected rather than
/// rounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty identifier means the payload carried none (or zero).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(numeric) => serializer.serialize_u64(numeric),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EventIdVisitor;

        impl<'de> Visitor<'de> for EventIdVisitor {
            type Value = EventId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or string event id")
            }

            // Zero is the "no id" sentinel, same as an absent field.
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<EventId, E> {
                if v == 0 {
                    Ok(EventId::default())
                } else {
                    Ok(EventId(v.to_string()))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<EventId, E> {
                if v == 0 {
                    Ok(EventId::default())
                } else {
                    Ok(EventId(v.to_string()))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EventId, E> {
                Ok(EventId(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<EventId, E> {
                Ok(EventId::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<EventId, E> {
                Ok(EventId::default())
            }
        }

        deserializer.deserialize_any(EventIdVisitor)
    }
}

// ============================================================================
// Event Kind
// ============================================================================

/// An event kind split into its recording type and action.
///
/// `todo_created` becomes `("todo", "created")` and
/// `question_answer_created` becomes `("question_answer", "created")`: the
/// split happens at the last underscore, so multi-word types stay whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKind<'a> {
    pub resource_type: &'a str,
    pub action: &'a str,
}

impl<'a> EventKind<'a> {
    /// Split an event kind at its last underscore.
    ///
    /// A kind without an underscore is all type and no action. This never
    /// fails, and `resource_type + "_" + action` reproduces the input whenever
    /// the input contained an underscore.
    ///
    /// # Examples
    ///
    /// ```
    /// use basecamp_sdk::webhook::EventKind;
    ///
    /// let kind = EventKind::parse("todo_created");
    /// assert_eq!(kind.resource_type, "todo");
    /// assert_eq!(kind.action, "created");
    ///
    /// let kind = EventKind::parse("ping");
    /// assert_eq!(kind.resource_type, "ping");
    /// assert_eq!(kind.action, "");
    /// ```
    pub fn parse(kind: &'a str) -> Self {
        match kind.rsplit_once('_') {
            Some((resource_type, action)) => Self {
                resource_type,
                action,
            },
            None => Self {
                resource_type: kind,
                action: "",
            },
        }
    }
}

/// Split an event kind into recording type and action.
pub fn parse_event_kind(kind: &str) -> EventKind<'_> {
    EventKind::parse(kind)
}

// ============================================================================
// Payload Types
// ============================================================================

/// A webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: EventId,

    /// Empty when absent or `null`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub kind: String,

    /// Kind-specific details, passed through untyped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<WebhookRecording>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Person>,

    /// Present on `*_copied` and `*_moved` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<WebhookCopy>,
}

impl WebhookEvent {
    /// Parse this event's kind into type and action.
    pub fn parsed_kind(&self) -> EventKind<'_> {
        EventKind::parse(&self.kind)
    }

    /// The event timestamp, if present and valid RFC 3339.
    pub fn created_at_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.created_at
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The recording an event is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookRecording {
    pub id: Option<i64>,
    pub status: Option<String>,
    pub visible_to_clients: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub title: Option<String>,
    pub inherits_status: Option<bool>,
    #[serde(rename = "type")]
    pub recording_type: Option<String>,
    pub url: Option<String>,
    pub app_url: Option<String>,
    pub bookmark_url: Option<String>,
    pub content: Option<String>,
    pub comments_count: Option<i64>,
    pub comments_url: Option<String>,
    pub subscription_url: Option<String>,
    pub parent: Option<RecordingParent>,
    pub bucket: Option<Bucket>,
    pub creator: Option<Person>,
}

/// The parent recording of a nested recording (a todo's todolist, etc.).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingParent {
    pub id: Option<i64>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub recording_type: Option<String>,
    pub url: Option<String>,
    pub app_url: Option<String>,
}

/// The project (bucket) a recording lives in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bucket {
    pub id: Option<i64>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub bucket_type: Option<String>,
}

/// The person who caused an event or created a recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: Option<i64>,
    pub attachable_sgid: Option<String>,
    pub name: Option<String>,
    pub email_address: Option<String>,
    pub personable_type: Option<String>,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub admin: Option<bool>,
    pub owner: Option<bool>,
    pub client: Option<bool>,
    pub employee: Option<bool>,
    pub time_zone: Option<String>,
    pub avatar_url: Option<String>,
    pub company: Option<PersonCompany>,
    pub can_manage_projects: Option<bool>,
    pub can_manage_people: Option<bool>,
    pub can_ping: Option<bool>,
    pub can_access_timesheet: Option<bool>,
    pub can_access_hill_charts: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonCompany {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// Destination of a copy or move.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookCopy {
    pub id: Option<i64>,
    pub url: Option<String>,
    pub app_url: Option<String>,
    pub bucket: Option<CopyBucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyBucket {
    pub id: Option<i64>,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
