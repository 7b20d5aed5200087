//! Environment types: worlds, rooms, entities, participants and relationships.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::primitives::{Metadata, UUID};

/// Kind of conversation channel a room represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Messages to self
    #[serde(rename = "SELF")]
    SelfChannel,
    /// Direct messages between two participants
    #[serde(rename = "dm")]
    Dm,
    /// Group messages
    #[serde(rename = "group")]
    Group,
    /// Voice direct message
    #[serde(rename = "VOICE_DM")]
    VoiceDm,
    /// Voice channel with multiple participants
    #[serde(rename = "VOICE_GROUP")]
    VoiceGroup,
    /// Social media feed
    #[serde(rename = "FEED")]
    Feed,
    /// Threaded conversation
    #[serde(rename = "THREAD")]
    Thread,
    /// World-wide channel
    #[serde(rename = "WORLD")]
    World,
    /// Forum discussion
    #[serde(rename = "FORUM")]
    Forum,
    /// Programmatic API access
    #[serde(rename = "API")]
    Api,
}

/// Role an entity holds inside a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// World owner
    Owner,
    /// Administrator
    Admin,
    /// No special role
    #[default]
    None,
}

/// World ownership metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldOwnership {
    pub owner_id: String,
}

/// World metadata: ownership and the role map keyed by entity id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<WorldOwnership>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub roles: HashMap<String, Role>,
    #[serde(flatten)]
    pub extra: Metadata,
}

/// A top-level grouping of rooms (server, guild, workspace).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub agent_id: UUID,
    /// Platform-side identifier of the server
    pub server_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorldMetadata>,
}

/// A conversation channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UUID>,
    /// Source system, e.g. `discord`
    pub source: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Room {
    /// A room with only the required fields set.
    pub fn new(id: UUID, source: impl Into<String>, channel_type: ChannelType) -> Self {
        Room {
            id,
            name: None,
            agent_id: None,
            source: source.into(),
            channel_type,
            channel_id: None,
            server_id: None,
            world_id: None,
            metadata: None,
        }
    }
}

/// Extensible data attached to an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: UUID,
    pub entity_id: UUID,
    pub agent_id: UUID,
    pub room_id: UUID,
    pub world_id: UUID,
    pub source_entity_id: UUID,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub data: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// A participant (human or agent).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    /// Display names, most specific first
    #[serde(default)]
    pub names: Vec<String>,
    /// Per-source metadata, e.g. `{"discord": {"username": ..}}`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
    pub agent_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

/// Room membership record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: UUID,
    pub entity: Entity,
}

/// Per-participant attention state in a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantUserState {
    /// Agent follows the room and replies freely
    Followed,
    /// Agent ignores the room
    Muted,
}

/// A directed, tag-labelled edge between two entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: UUID,
    pub source_entity_id: UUID,
    pub target_entity_id: UUID,
    pub agent_id: UUID,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_channel_type_wire_names() {
        assert_eq!(serde_json::to_string(&ChannelType::Dm).unwrap(), "\"dm\"");
        assert_eq!(
            serde_json::to_string(&ChannelType::SelfChannel).unwrap(),
            "\"SELF\""
        );
        let parsed: ChannelType = serde_json::from_str("\"VOICE_GROUP\"").unwrap();
        assert_eq!(parsed, ChannelType::VoiceGroup);
    }

    #[test]
    fn test_world_roles_round_trip() {
        let owner = UUID::new_v4();
        let mut metadata = WorldMetadata::default();
        metadata.roles.insert(owner.to_string(), Role::Owner);

        let world = World {
            id: UUID::new_v4(),
            name: Some("guild".to_string()),
            agent_id: UUID::new_v4(),
            server_id: "123".to_string(),
            metadata: Some(metadata),
        };

        let json = serde_json::to_value(&world).unwrap();
        assert_eq!(json["metadata"]["roles"][owner.as_str()], "OWNER");
        let back: World = serde_json::from_value(json).unwrap();
        assert_eq!(back, world);
    }
}
