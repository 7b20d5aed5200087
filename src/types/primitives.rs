//! Primitive types: identifiers, message content and media.

use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

lazy_static! {
    static ref UUID_REGEX: Regex =
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap();
}

/// Characters `encodeURIComponent` leaves untouched: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Error type for UUID operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UUIDError {
    /// Invalid UUID format
    #[error("Invalid UUID format: {0}")]
    InvalidFormat(String),
}

/// A 128-bit identifier in canonical lowercase hyphenated form.
///
/// Serializes transparently as a string. Equality is exact string match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UUID(String);

/// The nil UUID, used where no room or world is specified.
pub const DEFAULT_UUID_STR: &str = "00000000-0000-0000-0000-000000000000";

impl UUID {
    /// Create a UUID from a string, validating the format
    pub fn new(id: &str) -> Result<Self, UUIDError> {
        let lowered = id.to_lowercase();
        if !UUID_REGEX.is_match(&lowered) {
            return Err(UUIDError::InvalidFormat(id.to_string()));
        }
        Ok(UUID(lowered))
    }

    /// Create a new random UUID (v4)
    pub fn new_v4() -> Self {
        UUID(uuid::Uuid::new_v4().to_string())
    }

    /// The nil UUID
    pub fn default_uuid() -> Self {
        UUID(DEFAULT_UUID_STR.to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for UUID {
    fn default() -> Self {
        UUID::default_uuid()
    }
}

impl fmt::Display for UUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for UUID {
    type Error = UUIDError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        UUID::new(value)
    }
}

impl TryFrom<String> for UUID {
    type Error = UUIDError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        UUID::new(&value)
    }
}

impl From<uuid::Uuid> for UUID {
    fn from(value: uuid::Uuid) -> Self {
        UUID(value.to_string())
    }
}

/// Strict validation: returns an error for anything that is not a UUID.
pub fn as_uuid(id: &str) -> Result<UUID, UUIDError> {
    UUID::new(id)
}

/// Nullable validation: `None` for anything that is not a UUID.
pub fn validate_uuid(value: &str) -> Option<UUID> {
    UUID::new(value).ok()
}

/// Derives a deterministic UUID from any string-like value.
///
/// Inputs that already are UUIDs come back unchanged (lowercased). Otherwise the
/// input is escaped like `encodeURIComponent`, hashed with SHA-1, and the first
/// 16 bytes become the UUID with RFC4122 variant bits and a version nibble of 0.
pub fn string_to_uuid<T: ToString>(target: T) -> UUID {
    let s = target.to_string();

    if let Ok(existing) = UUID::new(&s) {
        return existing;
    }

    let escaped = utf8_percent_encode(&s, URI_COMPONENT).to_string();
    let digest = Sha1::digest(escaped.as_bytes());

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    bytes[6] &= 0x0f;

    UUID(uuid::Uuid::from_bytes(bytes).to_string())
}

/// Agent-scoped deterministic id: the same `base` maps to different ids for
/// different agents, and the agent's own id maps to itself.
pub fn create_unique_uuid(agent_id: &UUID, base: &str) -> UUID {
    if base == agent_id.as_str() {
        return agent_id.clone();
    }
    string_to_uuid(format!("{}:{}", base, agent_id))
}

/// Content type enumeration for media
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Image content
    Image,
    /// Video content
    Video,
    /// Audio content
    Audio,
    /// Document content
    Document,
    /// Link content
    Link,
}

/// A media attachment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// Unique identifier
    pub id: String,
    /// Media URL
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

/// Content of a memory or message: text plus structured fields.
///
/// `actions` names the actions a response wants executed, in order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// The agent's internal thought process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    /// The main text content visible to users
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Actions to be performed, by name or simile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    /// Providers to include when composing state for this content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,
    /// Source/origin of the content (e.g., 'discord', 'telegram')
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Parent message when this is a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Media>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<super::environment::ChannelType>,
    /// Additional dynamic properties
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Content {
    /// Text-only content
    pub fn text(text: impl Into<String>) -> Self {
        Content {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Content naming actions to run, in order
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = Some(actions.into_iter().map(Into::into).collect());
        self
    }
}

/// A generic type for metadata objects
pub type Metadata = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_validation() {
        assert!(UUID::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(UUID::new("not-a-uuid").is_err());
        assert_eq!(
            UUID::new("550E8400-E29B-41D4-A716-446655440000").unwrap().as_str(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_validate_uuid_is_nullable() {
        assert!(validate_uuid("nope").is_none());
        assert!(validate_uuid(DEFAULT_UUID_STR).is_some());
        assert_eq!(
            as_uuid("nope"),
            Err(UUIDError::InvalidFormat("nope".to_string()))
        );
    }

    #[test]
    fn test_default_uuid_is_nil() {
        assert_eq!(UUID::default().as_str(), DEFAULT_UUID_STR);
        assert_eq!(UUID::default(), UUID::default_uuid());
    }

    #[test]
    fn test_uuid_v4_generation() {
        let uuid = UUID::new_v4();
        assert!(UUID_REGEX.is_match(uuid.as_str()));
        assert_ne!(uuid, UUID::new_v4());
    }

    #[test]
    fn test_string_to_uuid_known_vectors() {
        let vectors = [
            ("test", "a94a8fe5-ccb1-0ba6-9c4c-0873d391e987"),
            ("hello world", "f0355dd5-2823-054c-ae66-a0b12842c215"),
            ("", "da39a3ee-5e6b-0b0d-b255-bfef95601890"),
            ("123", "40bd0015-6308-0fc3-9165-329ea1ff5c5e"),
            ("user:agent", "a49810ce-da30-0d3b-97ee-d4d47774d8af"),
        ];

        for (input, expected) in vectors {
            assert_eq!(string_to_uuid(input).as_str(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_string_to_uuid_returns_existing_uuid_unchanged() {
        let existing = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(string_to_uuid(existing).as_str(), existing);
    }

    #[test]
    fn test_string_to_uuid_sets_format_bits() {
        let uuid = string_to_uuid("some arbitrary input ✓");
        let parts: Vec<&str> = uuid.as_str().split('-').collect();
        assert_eq!(parts.len(), 5);

        let variant_byte = u8::from_str_radix(&parts[3][0..2], 16).unwrap();
        assert_eq!(variant_byte & 0xc0, 0x80);
        assert_eq!(&parts[2][0..1], "0");
    }

    #[test]
    fn test_create_unique_uuid_is_agent_scoped() {
        let agent_a = UUID::new_v4();
        let agent_b = UUID::new_v4();

        let a = create_unique_uuid(&agent_a, "server-1");
        assert_eq!(a, create_unique_uuid(&agent_a, "server-1"));
        assert_ne!(a, create_unique_uuid(&agent_b, "server-1"));
        assert_eq!(create_unique_uuid(&agent_a, agent_a.as_str()), agent_a);
    }

    #[test]
    fn test_content_serialization_is_camel_case() {
        let content = Content {
            in_reply_to: Some(UUID::new_v4()),
            ..Content::text("Hello, world!")
        };
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains("\"text\":\"Hello, world!\""));
        assert!(json.contains("\"inReplyTo\""));
        assert!(!json.contains("actions"));
    }
}
