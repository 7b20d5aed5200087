//! World role lookups.

use anyhow::Result;
use tracing::debug;

use crate::error::RuntimeError;
use crate::runtime::AgentRuntime;
use crate::types::environment::{Role, World};
use crate::types::primitives::{create_unique_uuid, UUID};

/// Role of an entity in the world of `server_id`; `Role::None` when the world
/// or its role map is missing.
pub async fn get_user_server_role(
    runtime: &AgentRuntime,
    entity_id: &UUID,
    server_id: &str,
) -> Result<Role> {
    let world_id = create_unique_uuid(&runtime.agent_id, server_id);
    let world = runtime.require_adapter()?.get_world(&world_id).await?;
    Ok(role_in(world.as_ref(), entity_id))
}

/// The first world whose recorded owner is `entity_id`.
pub async fn find_world_for_owner(runtime: &AgentRuntime, entity_id: &str) -> Result<Option<World>> {
    if entity_id.trim().is_empty() {
        return Err(RuntimeError::Configuration("User ID is required to find server".into()).into());
    }

    let worlds = runtime.require_adapter()?.get_all_worlds().await?;
    let found = worlds.into_iter().find(|world| {
        world
            .metadata
            .as_ref()
            .and_then(|m| m.ownership.as_ref())
            .is_some_and(|o| o.owner_id == entity_id)
    });
    if found.is_none() {
        debug!(entity_id, "No world found for owner");
    }
    Ok(found)
}

/// Role of an entity in the world a room belongs to. The room must exist.
pub async fn require_room_role(
    runtime: &AgentRuntime,
    entity_id: &UUID,
    room_id: &UUID,
) -> Result<Role> {
    let adapter = runtime.require_adapter()?;
    let room = adapter
        .get_room(room_id)
        .await?
        .ok_or_else(|| RuntimeError::RoomNotFound(room_id.clone()))?;
    let world = match &room.world_id {
        Some(world_id) => adapter.get_world(world_id).await?,
        None => None,
    };
    Ok(role_in(world.as_ref(), entity_id))
}

fn role_in(world: Option<&World>, entity_id: &UUID) -> Role {
    world
        .and_then(|w| w.metadata.as_ref())
        .and_then(|m| m.roles.get(entity_id.as_str()))
        .copied()
        .unwrap_or_default()
}
