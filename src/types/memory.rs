//! Memory types: conversational records and their metadata.

use serde::{Deserialize, Serialize};

use super::primitives::{Content, Metadata, UUID};

/// Logical tables memories are stored under.
pub mod table {
    /// Conversation log
    pub const MESSAGES: &str = "messages";
    /// Extracted facts
    pub const FACTS: &str = "facts";
    /// Whole knowledge documents
    pub const DOCUMENTS: &str = "documents";
    /// Embedded document fragments
    pub const KNOWLEDGE: &str = "knowledge";
}

/// Kind of record a memory holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// A complete document
    Document,
    /// A chunk of a document
    Fragment,
    /// A conversation message
    Message,
    /// A description of an entity or thing
    Description,
    /// Anything else
    Custom,
}

/// Visibility of a memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Visible to every agent
    Shared,
    /// Visible only to the owning agent
    Private,
    /// Visible within the room
    Room,
}

/// Memory metadata payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<MemoryScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Parent document of a fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<UUID>,
    /// Position of a fragment within its document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(flatten)]
    pub extra: Metadata,
}

impl MemoryMetadata {
    /// Metadata of the given type with every optional field empty
    pub fn of_type(memory_type: MemoryType) -> Self {
        MemoryMetadata {
            memory_type,
            timestamp: None,
            scope: None,
            source: None,
            document_id: None,
            position: None,
            extra: Metadata::new(),
        }
    }
}

/// An atomic record of conversational content.
///
/// Every memory belongs to exactly one room and references exactly one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    pub entity_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UUID>,
    /// Milliseconds since epoch, assigned by the adapter when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub room_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Similarity score, set when returned from a search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MemoryMetadata>,
}

impl Default for Memory {
    fn default() -> Self {
        Memory {
            id: None,
            entity_id: UUID::default_uuid(),
            agent_id: None,
            created_at: None,
            content: Content::default(),
            embedding: None,
            room_id: UUID::default_uuid(),
            world_id: None,
            unique: None,
            similarity: None,
            metadata: None,
        }
    }
}

impl Memory {
    /// A fresh memory with a random id.
    pub fn new(entity_id: UUID, room_id: UUID, content: Content) -> Self {
        Memory {
            id: Some(UUID::new_v4()),
            entity_id,
            room_id,
            content,
            ..Default::default()
        }
    }

    /// A message memory stamped with message metadata.
    ///
    /// Scope is `private` when an agent owns the message, `shared` otherwise.
    pub fn message(
        entity_id: UUID,
        room_id: UUID,
        agent_id: Option<UUID>,
        content: Content,
    ) -> Self {
        let scope = if agent_id.is_some() {
            MemoryScope::Private
        } else {
            MemoryScope::Shared
        };
        let mut metadata = MemoryMetadata::of_type(MemoryType::Message);
        metadata.timestamp = Some(chrono::Utc::now().timestamp_millis());
        metadata.scope = Some(scope);
        metadata.source = content.source.clone();

        Memory {
            agent_id,
            metadata: Some(metadata),
            ..Memory::new(entity_id, room_id, content)
        }
    }

    /// Text of the content, empty when absent
    pub fn text(&self) -> &str {
        self.content.text.as_deref().unwrap_or("")
    }

    /// Memory type recorded in metadata, if any
    pub fn memory_type(&self) -> Option<MemoryType> {
        self.metadata.as_ref().map(|m| m.memory_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_scope_follows_agent_presence() {
        let entity = UUID::new_v4();
        let room = UUID::new_v4();

        let private = Memory::message(
            entity.clone(),
            room.clone(),
            Some(UUID::new_v4()),
            Content::text("hi"),
        );
        let shared = Memory::message(entity, room, None, Content::text("hi"));

        assert_eq!(
            private.metadata.as_ref().and_then(|m| m.scope),
            Some(MemoryScope::Private)
        );
        assert_eq!(
            shared.metadata.as_ref().and_then(|m| m.scope),
            Some(MemoryScope::Shared)
        );
        assert_eq!(shared.memory_type(), Some(MemoryType::Message));
    }

    #[test]
    fn test_metadata_wire_shape() {
        let mut metadata = MemoryMetadata::of_type(MemoryType::Fragment);
        metadata.position = Some(2);
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({"type": "fragment", "position": 2}));
    }
}
