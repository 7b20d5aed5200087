//! Persistence adapter contract and its query types.
//!
//! Nullable lookups (`get_room`, `get_entity_by_id`, ...) return `Ok(None)`
//! when the record is absent. Every other failure is an `Err`, never a silent
//! empty value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::environment::{
    Component, Entity, Participant, ParticipantUserState, Relationship, Room, World,
};
use super::memory::Memory;
use super::primitives::{Metadata, UUID};
use super::task::{GetTasksParams, Task};

/// Parameters for listing memories, newest first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMemoriesParams {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Inclusive lower bound on `createdAt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// Inclusive upper bound on `createdAt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Parameters for similarity search over memory embeddings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMemoriesParams {
    pub table_name: String,
    pub embedding: Vec<f32>,
    /// Minimum cosine similarity for a match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

/// Parameters for upserting a relationship.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipParams {
    pub source_entity_id: UUID,
    pub target_entity_id: UUID,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Parameters for listing logs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogsParams {
    pub entity_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub log_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// A structured log entry (action runs, evaluator runs, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    pub entity_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    pub body: Value,
    #[serde(rename = "type")]
    pub log_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Storage operations the runtime needs from a persistence backend.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Prepare the backend
    async fn init(&self) -> anyhow::Result<()>;
    /// Release the backend
    async fn close(&self) -> anyhow::Result<()>;
    async fn is_ready(&self) -> anyhow::Result<bool>;

    // Entities
    async fn get_entity_by_id(&self, id: &UUID) -> anyhow::Result<Option<Entity>>;
    async fn get_entities_for_room(&self, room_id: &UUID) -> anyhow::Result<Vec<Entity>>;
    async fn create_entity(&self, entity: &Entity) -> anyhow::Result<bool>;
    async fn update_entity(&self, entity: &Entity) -> anyhow::Result<()>;

    // Components
    async fn get_component(
        &self,
        entity_id: &UUID,
        component_type: &str,
        world_id: Option<&UUID>,
        source_entity_id: Option<&UUID>,
    ) -> anyhow::Result<Option<Component>>;
    async fn get_components(&self, entity_id: &UUID) -> anyhow::Result<Vec<Component>>;
    async fn create_component(&self, component: &Component) -> anyhow::Result<bool>;
    async fn update_component(&self, component: &Component) -> anyhow::Result<()>;
    async fn delete_component(&self, component_id: &UUID) -> anyhow::Result<()>;

    // Memories
    async fn get_memories(&self, params: GetMemoriesParams) -> anyhow::Result<Vec<Memory>>;
    async fn get_memory_by_id(&self, id: &UUID) -> anyhow::Result<Option<Memory>>;
    async fn get_memories_by_ids(
        &self,
        ids: &[UUID],
        table_name: Option<&str>,
    ) -> anyhow::Result<Vec<Memory>>;
    async fn search_memories(&self, params: SearchMemoriesParams) -> anyhow::Result<Vec<Memory>>;
    /// Stores a memory and returns its id (assigned when absent)
    async fn create_memory(
        &self,
        memory: &Memory,
        table_name: &str,
        unique: bool,
    ) -> anyhow::Result<UUID>;
    async fn update_memory(&self, memory: &Memory) -> anyhow::Result<bool>;
    async fn delete_memory(&self, memory_id: &UUID) -> anyhow::Result<()>;
    async fn delete_all_memories(&self, room_id: &UUID, table_name: &str) -> anyhow::Result<()>;
    async fn count_memories(
        &self,
        room_id: &UUID,
        unique: bool,
        table_name: &str,
    ) -> anyhow::Result<usize>;

    // Logs
    async fn log(&self, log: &Log) -> anyhow::Result<()>;
    async fn get_logs(&self, params: GetLogsParams) -> anyhow::Result<Vec<Log>>;
    async fn delete_log(&self, log_id: &UUID) -> anyhow::Result<()>;

    // Worlds
    async fn create_world(&self, world: &World) -> anyhow::Result<UUID>;
    async fn get_world(&self, id: &UUID) -> anyhow::Result<Option<World>>;
    async fn get_all_worlds(&self) -> anyhow::Result<Vec<World>>;
    async fn update_world(&self, world: &World) -> anyhow::Result<()>;

    // Rooms
    async fn get_room(&self, id: &UUID) -> anyhow::Result<Option<Room>>;
    async fn get_rooms(&self, world_id: &UUID) -> anyhow::Result<Vec<Room>>;
    async fn create_room(&self, room: &Room) -> anyhow::Result<UUID>;
    async fn update_room(&self, room: &Room) -> anyhow::Result<()>;
    async fn delete_room(&self, room_id: &UUID) -> anyhow::Result<()>;
    async fn get_rooms_for_participant(&self, entity_id: &UUID) -> anyhow::Result<Vec<UUID>>;

    // Participants
    async fn add_participant(&self, entity_id: &UUID, room_id: &UUID) -> anyhow::Result<bool>;
    async fn remove_participant(&self, entity_id: &UUID, room_id: &UUID) -> anyhow::Result<bool>;
    async fn get_participants_for_entity(&self, entity_id: &UUID)
        -> anyhow::Result<Vec<Participant>>;
    async fn get_participants_for_room(&self, room_id: &UUID) -> anyhow::Result<Vec<UUID>>;
    async fn get_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
    ) -> anyhow::Result<Option<ParticipantUserState>>;
    async fn set_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
        state: Option<ParticipantUserState>,
    ) -> anyhow::Result<()>;

    // Relationships
    /// Inserts or updates the edge between the two entities
    async fn create_relationship(&self, params: RelationshipParams) -> anyhow::Result<bool>;
    async fn update_relationship(&self, relationship: &Relationship) -> anyhow::Result<()>;
    async fn get_relationship(
        &self,
        source_entity_id: &UUID,
        target_entity_id: &UUID,
    ) -> anyhow::Result<Option<Relationship>>;
    /// Edges touching the entity, optionally filtered to those carrying any of `tags`
    async fn get_relationships(
        &self,
        entity_id: &UUID,
        tags: Option<&[String]>,
    ) -> anyhow::Result<Vec<Relationship>>;

    // Cache
    async fn get_cache(&self, key: &str) -> anyhow::Result<Option<Value>>;
    async fn set_cache(&self, key: &str, value: Value) -> anyhow::Result<bool>;
    async fn delete_cache(&self, key: &str) -> anyhow::Result<bool>;

    // Tasks
    async fn create_task(&self, task: &Task) -> anyhow::Result<UUID>;
    async fn get_tasks(&self, params: GetTasksParams) -> anyhow::Result<Vec<Task>>;
    async fn get_task(&self, id: &UUID) -> anyhow::Result<Option<Task>>;
    async fn get_tasks_by_name(&self, name: &str) -> anyhow::Result<Vec<Task>>;
    async fn update_task(&self, id: &UUID, task: &Task) -> anyhow::Result<()>;
    async fn delete_task(&self, id: &UUID) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_memories_params_serialization() {
        let params = GetMemoriesParams {
            table_name: "messages".to_string(),
            count: Some(10),
            ..Default::default()
        };

        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"tableName\":\"messages\""));
        assert!(json.contains("\"count\":10"));
        assert!(!json.contains("roomId"));
    }

    #[test]
    fn test_log_and_relationship_params_default_to_nil_ids() {
        let logs = GetLogsParams::default();
        assert_eq!(logs.entity_id, UUID::default_uuid());
        assert!(logs.log_type.is_none());

        let relationship = RelationshipParams::default();
        assert_eq!(relationship.source_entity_id.as_str(), super::super::primitives::DEFAULT_UUID_STR);
        assert!(relationship.tags.is_empty());
    }
}
