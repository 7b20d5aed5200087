//! Lazy creation of the entities, worlds and rooms a conversation touches.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::AgentRuntime;
use crate::types::environment::{ChannelType, Entity, Room, World, WorldMetadata};
use crate::types::primitives::{create_unique_uuid, Metadata, UUID};

/// Everything known about a sender on first contact.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    pub entity_id: UUID,
    pub room_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
}

impl ConnectionParams {
    pub fn new(
        entity_id: UUID,
        room_id: UUID,
        source: impl Into<String>,
        channel_type: ChannelType,
    ) -> Self {
        ConnectionParams {
            entity_id,
            room_id,
            user_name: None,
            name: None,
            source: source.into(),
            channel_type,
            channel_id: None,
            server_id: None,
            world_id: None,
        }
    }
}

impl AgentRuntime {
    /// Create the world unless one with its id exists.
    pub async fn ensure_world_exists(&self, world: &World) -> Result<()> {
        let adapter = self.require_adapter()?;
        if adapter.get_world(&world.id).await?.is_none() {
            debug!(world_id = %world.id, server_id = %world.server_id, "Creating world");
            adapter.create_world(world).await?;
        }
        Ok(())
    }

    /// Create the room unless one with its id exists.
    pub async fn ensure_room_exists(&self, room: &Room) -> Result<()> {
        let adapter = self.require_adapter()?;
        if adapter.get_room(&room.id).await?.is_none() {
            debug!(room_id = %room.id, source = %room.source, "Creating room");
            adapter.create_room(room).await?;
        }
        Ok(())
    }

    /// Add the entity to the room. The entity must exist; the agent itself
    /// is always accepted.
    pub async fn ensure_participant_in_room(&self, entity_id: &UUID, room_id: &UUID) -> Result<()> {
        let adapter = self.require_adapter()?;
        if *entity_id != self.agent_id && adapter.get_entity_by_id(entity_id).await?.is_none() {
            bail!("User {entity_id} not found, cannot add to room {room_id}");
        }
        let participants = adapter.get_participants_for_room(room_id).await?;
        if !participants.contains(entity_id) {
            adapter.add_participant(entity_id, room_id).await?;
            debug!(entity_id = %entity_id, room_id = %room_id, "Added participant");
        }
        Ok(())
    }

    /// Make sure the sender, their world and room exist and that both the
    /// sender and the agent participate in the room. Re-running is a no-op.
    pub async fn ensure_connection(&self, params: &ConnectionParams) -> Result<()> {
        let adapter = self.require_adapter()?;

        let names: Vec<String> = [params.name.clone(), params.user_name.clone()]
            .into_iter()
            .flatten()
            .collect();
        if adapter.get_entity_by_id(&params.entity_id).await?.is_none() {
            let mut metadata = Metadata::new();
            metadata.insert(
                params.source.clone(),
                json!({ "name": params.name, "userName": params.user_name }),
            );
            let entity = Entity {
                id: Some(params.entity_id.clone()),
                names,
                metadata,
                agent_id: self.agent_id.clone(),
                components: None,
            };
            adapter.create_entity(&entity).await?;
            debug!(entity_id = %params.entity_id, source = %params.source, "Created entity");
        }

        let world_id = match (&params.world_id, &params.server_id) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(server_id)) => Some(create_unique_uuid(&self.agent_id, server_id)),
            (None, None) => None,
        };
        if let Some(world_id) = &world_id {
            self.ensure_world_exists(&World {
                id: world_id.clone(),
                name: params.server_id.clone(),
                agent_id: self.agent_id.clone(),
                server_id: params.server_id.clone().unwrap_or_default(),
                metadata: Some(WorldMetadata::default()),
            })
            .await?;
        }

        let mut room = Room::new(params.room_id.clone(), params.source.clone(), params.channel_type);
        room.agent_id = Some(self.agent_id.clone());
        room.channel_id = params.channel_id.clone();
        room.server_id = params.server_id.clone();
        room.world_id = world_id;
        self.ensure_room_exists(&room).await?;

        self.ensure_participant_in_room(&params.entity_id, &params.room_id)
            .await?;
        self.ensure_participant_in_room(&self.agent_id, &params.room_id)
            .await?;
        Ok(())
    }
}
