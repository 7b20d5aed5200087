//! Ephemeral [`DatabaseAdapter`] backed by in-process maps.
//!
//! Everything lives behind one `parking_lot` lock and is lost when the
//! adapter is dropped. Listings are newest first; similarity search uses
//! cosine similarity over stored embeddings.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::database::{
    DatabaseAdapter, GetLogsParams, GetMemoriesParams, Log, RelationshipParams,
    SearchMemoriesParams,
};
use crate::types::environment::{
    Component, Entity, Participant, ParticipantUserState, Relationship, Room, World,
};
use crate::types::memory::Memory;
use crate::types::primitives::{string_to_uuid, UUID};
use crate::types::task::{GetTasksParams, Task};

struct StoredMemory {
    table: String,
    /// Insertion counter, breaks `created_at` ties
    seq: u64,
    memory: Memory,
}

#[derive(Default)]
struct Store {
    seq: u64,
    entities: HashMap<UUID, Entity>,
    components: HashMap<UUID, Component>,
    memories: HashMap<UUID, StoredMemory>,
    logs: Vec<Log>,
    worlds: HashMap<UUID, World>,
    rooms: HashMap<UUID, Room>,
    /// room -> (entity, state), in join order
    participants: HashMap<UUID, Vec<(UUID, Option<ParticipantUserState>)>>,
    relationships: HashMap<(UUID, UUID), Relationship>,
    cache: HashMap<String, Value>,
    tasks: HashMap<UUID, Task>,
}

impl Store {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cosine similarity; zero for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// In-memory persistence for tests and embedders.
pub struct InMemoryDatabaseAdapter {
    agent_id: UUID,
    ready: AtomicBool,
    store: RwLock<Store>,
}

impl Default for InMemoryDatabaseAdapter {
    fn default() -> Self {
        InMemoryDatabaseAdapter::new()
    }
}

impl InMemoryDatabaseAdapter {
    pub fn new() -> Self {
        InMemoryDatabaseAdapter {
            agent_id: UUID::default_uuid(),
            ready: AtomicBool::new(false),
            store: RwLock::new(Store::default()),
        }
    }

    /// Adapter stamping relationships with `agent_id`
    pub fn for_agent(agent_id: UUID) -> Self {
        InMemoryDatabaseAdapter {
            agent_id,
            ..InMemoryDatabaseAdapter::new()
        }
    }

    fn newest_first(memories: &mut [&StoredMemory]) {
        memories.sort_by(|a, b| {
            b.memory
                .created_at
                .cmp(&a.memory.created_at)
                .then(b.seq.cmp(&a.seq))
        });
    }
}

#[async_trait]
impl DatabaseAdapter for InMemoryDatabaseAdapter {
    async fn init(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_ready(&self) -> Result<bool> {
        Ok(self.ready.load(Ordering::SeqCst))
    }

    // Entities

    async fn get_entity_by_id(&self, id: &UUID) -> Result<Option<Entity>> {
        Ok(self.store.read().entities.get(id).cloned())
    }

    async fn get_entities_for_room(&self, room_id: &UUID) -> Result<Vec<Entity>> {
        let store = self.store.read();
        Ok(store
            .participants
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|(id, _)| store.entities.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_entity(&self, entity: &Entity) -> Result<bool> {
        let Some(id) = entity.id.clone() else {
            bail!("Entity id is required");
        };
        let mut store = self.store.write();
        if store.entities.contains_key(&id) {
            return Ok(false);
        }
        store.entities.insert(id, entity.clone());
        Ok(true)
    }

    async fn update_entity(&self, entity: &Entity) -> Result<()> {
        let Some(id) = entity.id.clone() else {
            bail!("Entity id is required");
        };
        let mut store = self.store.write();
        match store.entities.get_mut(&id) {
            Some(existing) => {
                *existing = entity.clone();
                Ok(())
            }
            None => bail!("Entity {id} not found"),
        }
    }

    // Components

    async fn get_component(
        &self,
        entity_id: &UUID,
        component_type: &str,
        world_id: Option<&UUID>,
        source_entity_id: Option<&UUID>,
    ) -> Result<Option<Component>> {
        Ok(self
            .store
            .read()
            .components
            .values()
            .find(|c| {
                c.entity_id == *entity_id
                    && c.component_type == component_type
                    && world_id.map_or(true, |w| c.world_id == *w)
                    && source_entity_id.map_or(true, |s| c.source_entity_id == *s)
            })
            .cloned())
    }

    async fn get_components(&self, entity_id: &UUID) -> Result<Vec<Component>> {
        Ok(self
            .store
            .read()
            .components
            .values()
            .filter(|c| c.entity_id == *entity_id)
            .cloned()
            .collect())
    }

    async fn create_component(&self, component: &Component) -> Result<bool> {
        let mut store = self.store.write();
        if store.components.contains_key(&component.id) {
            return Ok(false);
        }
        let mut component = component.clone();
        component.created_at.get_or_insert_with(now_ms);
        store.components.insert(component.id.clone(), component);
        Ok(true)
    }

    async fn update_component(&self, component: &Component) -> Result<()> {
        let mut store = self.store.write();
        match store.components.get_mut(&component.id) {
            Some(existing) => {
                *existing = component.clone();
                Ok(())
            }
            None => bail!("Component {} not found", component.id),
        }
    }

    async fn delete_component(&self, component_id: &UUID) -> Result<()> {
        self.store.write().components.remove(component_id);
        Ok(())
    }

    // Memories

    async fn get_memories(&self, params: GetMemoriesParams) -> Result<Vec<Memory>> {
        let store = self.store.read();
        let mut matches: Vec<&StoredMemory> = store
            .memories
            .values()
            .filter(|s| {
                let m = &s.memory;
                s.table == params.table_name
                    && params.room_id.as_ref().map_or(true, |r| m.room_id == *r)
                    && params.entity_id.as_ref().map_or(true, |e| m.entity_id == *e)
                    && params
                        .agent_id
                        .as_ref()
                        .map_or(true, |a| m.agent_id.as_ref() == Some(a))
                    && params
                        .world_id
                        .as_ref()
                        .map_or(true, |w| m.world_id.as_ref() == Some(w))
                    && params
                        .unique
                        .map_or(true, |u| !u || m.unique == Some(true))
                    && params
                        .start
                        .map_or(true, |start| m.created_at.is_some_and(|t| t >= start))
                    && params
                        .end
                        .map_or(true, |end| m.created_at.is_some_and(|t| t <= end))
            })
            .collect();
        Self::newest_first(&mut matches);

        let count = params.count.unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .take(count)
            .map(|s| s.memory.clone())
            .collect())
    }

    async fn get_memory_by_id(&self, id: &UUID) -> Result<Option<Memory>> {
        Ok(self.store.read().memories.get(id).map(|s| s.memory.clone()))
    }

    async fn get_memories_by_ids(
        &self,
        ids: &[UUID],
        table_name: Option<&str>,
    ) -> Result<Vec<Memory>> {
        let store = self.store.read();
        Ok(ids
            .iter()
            .filter_map(|id| store.memories.get(id))
            .filter(|s| table_name.map_or(true, |t| s.table == t))
            .map(|s| s.memory.clone())
            .collect())
    }

    async fn search_memories(&self, params: SearchMemoriesParams) -> Result<Vec<Memory>> {
        let threshold = params.match_threshold.unwrap_or(0.0);
        let store = self.store.read();

        let mut scored: Vec<(f32, &StoredMemory)> = store
            .memories
            .values()
            .filter(|s| {
                let m = &s.memory;
                s.table == params.table_name
                    && params.room_id.as_ref().map_or(true, |r| m.room_id == *r)
                    && params.entity_id.as_ref().map_or(true, |e| m.entity_id == *e)
                    && params
                        .world_id
                        .as_ref()
                        .map_or(true, |w| m.world_id.as_ref() == Some(w))
                    && params.unique.map_or(true, |u| !u || m.unique == Some(true))
            })
            .filter_map(|s| {
                let embedding = s.memory.embedding.as_deref()?;
                let score = cosine_similarity(&params.embedding, embedding);
                (score >= threshold).then_some((score, s))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.seq.cmp(&a.1.seq)));

        Ok(scored
            .into_iter()
            .take(params.count.unwrap_or(usize::MAX))
            .map(|(score, s)| Memory {
                similarity: Some(score),
                ..s.memory.clone()
            })
            .collect())
    }

    async fn create_memory(&self, memory: &Memory, table_name: &str, unique: bool) -> Result<UUID> {
        let mut memory = memory.clone();
        let id = memory.id.get_or_insert_with(UUID::new_v4).clone();
        memory.created_at.get_or_insert_with(now_ms);
        if unique {
            memory.unique = Some(true);
        }

        let mut store = self.store.write();
        let seq = store.next_seq();
        store.memories.insert(
            id.clone(),
            StoredMemory {
                table: table_name.to_string(),
                seq,
                memory,
            },
        );
        Ok(id)
    }

    async fn update_memory(&self, memory: &Memory) -> Result<bool> {
        let Some(id) = &memory.id else {
            return Ok(false);
        };
        let mut store = self.store.write();
        let Some(stored) = store.memories.get_mut(id) else {
            return Ok(false);
        };
        let created_at = stored.memory.created_at;
        stored.memory = memory.clone();
        if stored.memory.created_at.is_none() {
            stored.memory.created_at = created_at;
        }
        Ok(true)
    }

    async fn delete_memory(&self, memory_id: &UUID) -> Result<()> {
        self.store.write().memories.remove(memory_id);
        Ok(())
    }

    async fn delete_all_memories(&self, room_id: &UUID, table_name: &str) -> Result<()> {
        self.store
            .write()
            .memories
            .retain(|_, s| !(s.table == table_name && s.memory.room_id == *room_id));
        Ok(())
    }

    async fn count_memories(&self, room_id: &UUID, unique: bool, table_name: &str) -> Result<usize> {
        Ok(self
            .store
            .read()
            .memories
            .values()
            .filter(|s| {
                s.table == table_name
                    && s.memory.room_id == *room_id
                    && (!unique || s.memory.unique == Some(true))
            })
            .count())
    }

    // Logs

    async fn log(&self, log: &Log) -> Result<()> {
        let mut log = log.clone();
        log.id.get_or_insert_with(UUID::new_v4);
        log.created_at.get_or_insert_with(now_ms);
        self.store.write().logs.push(log);
        Ok(())
    }

    async fn get_logs(&self, params: GetLogsParams) -> Result<Vec<Log>> {
        Ok(self
            .store
            .read()
            .logs
            .iter()
            .rev()
            .filter(|l| {
                l.entity_id == params.entity_id
                    && params
                        .room_id
                        .as_ref()
                        .map_or(true, |r| l.room_id.as_ref() == Some(r))
                    && params.log_type.as_ref().map_or(true, |t| l.log_type == *t)
            })
            .take(params.count.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_log(&self, log_id: &UUID) -> Result<()> {
        self.store
            .write()
            .logs
            .retain(|l| l.id.as_ref() != Some(log_id));
        Ok(())
    }

    // Worlds

    async fn create_world(&self, world: &World) -> Result<UUID> {
        self.store
            .write()
            .worlds
            .insert(world.id.clone(), world.clone());
        Ok(world.id.clone())
    }

    async fn get_world(&self, id: &UUID) -> Result<Option<World>> {
        Ok(self.store.read().worlds.get(id).cloned())
    }

    async fn get_all_worlds(&self) -> Result<Vec<World>> {
        let mut worlds: Vec<World> = self.store.read().worlds.values().cloned().collect();
        worlds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(worlds)
    }

    async fn update_world(&self, world: &World) -> Result<()> {
        let mut store = self.store.write();
        match store.worlds.get_mut(&world.id) {
            Some(existing) => {
                *existing = world.clone();
                Ok(())
            }
            None => bail!("World {} not found", world.id),
        }
    }

    // Rooms

    async fn get_room(&self, id: &UUID) -> Result<Option<Room>> {
        Ok(self.store.read().rooms.get(id).cloned())
    }

    async fn get_rooms(&self, world_id: &UUID) -> Result<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .store
            .read()
            .rooms
            .values()
            .filter(|r| r.world_id.as_ref() == Some(world_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rooms)
    }

    async fn create_room(&self, room: &Room) -> Result<UUID> {
        self.store
            .write()
            .rooms
            .insert(room.id.clone(), room.clone());
        Ok(room.id.clone())
    }

    async fn update_room(&self, room: &Room) -> Result<()> {
        let mut store = self.store.write();
        match store.rooms.get_mut(&room.id) {
            Some(existing) => {
                *existing = room.clone();
                Ok(())
            }
            None => bail!("Room {} not found", room.id),
        }
    }

    async fn delete_room(&self, room_id: &UUID) -> Result<()> {
        let mut store = self.store.write();
        store.rooms.remove(room_id);
        store.participants.remove(room_id);
        store.memories.retain(|_, s| s.memory.room_id != *room_id);
        Ok(())
    }

    async fn get_rooms_for_participant(&self, entity_id: &UUID) -> Result<Vec<UUID>> {
        let mut rooms: Vec<UUID> = self
            .store
            .read()
            .participants
            .iter()
            .filter(|(_, members)| members.iter().any(|(e, _)| e == entity_id))
            .map(|(room, _)| room.clone())
            .collect();
        rooms.sort();
        Ok(rooms)
    }

    // Participants

    async fn add_participant(&self, entity_id: &UUID, room_id: &UUID) -> Result<bool> {
        let mut store = self.store.write();
        let members = store.participants.entry(room_id.clone()).or_default();
        if members.iter().any(|(e, _)| e == entity_id) {
            return Ok(false);
        }
        members.push((entity_id.clone(), None));
        Ok(true)
    }

    async fn remove_participant(&self, entity_id: &UUID, room_id: &UUID) -> Result<bool> {
        let mut store = self.store.write();
        let Some(members) = store.participants.get_mut(room_id) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|(e, _)| e != entity_id);
        Ok(members.len() != before)
    }

    async fn get_participants_for_entity(&self, entity_id: &UUID) -> Result<Vec<Participant>> {
        let store = self.store.read();
        let Some(entity) = store.entities.get(entity_id) else {
            return Ok(Vec::new());
        };
        let mut rooms: Vec<&UUID> = store
            .participants
            .iter()
            .filter(|(_, members)| members.iter().any(|(e, _)| e == entity_id))
            .map(|(room, _)| room)
            .collect();
        rooms.sort();
        Ok(rooms
            .into_iter()
            .map(|room| Participant {
                id: string_to_uuid(format!("{room}:{entity_id}")),
                entity: entity.clone(),
            })
            .collect())
    }

    async fn get_participants_for_room(&self, room_id: &UUID) -> Result<Vec<UUID>> {
        Ok(self
            .store
            .read()
            .participants
            .get(room_id)
            .map(|members| members.iter().map(|(e, _)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
    ) -> Result<Option<ParticipantUserState>> {
        Ok(self
            .store
            .read()
            .participants
            .get(room_id)
            .and_then(|members| members.iter().find(|(e, _)| e == entity_id))
            .and_then(|(_, state)| *state))
    }

    async fn set_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
        state: Option<ParticipantUserState>,
    ) -> Result<()> {
        let mut store = self.store.write();
        let member = store
            .participants
            .get_mut(room_id)
            .and_then(|members| members.iter_mut().find(|(e, _)| e == entity_id));
        match member {
            Some((_, current)) => {
                *current = state;
                Ok(())
            }
            None => bail!("Entity {entity_id} is not a participant of room {room_id}"),
        }
    }

    // Relationships

    async fn create_relationship(&self, params: RelationshipParams) -> Result<bool> {
        let key = (
            params.source_entity_id.clone(),
            params.target_entity_id.clone(),
        );
        let mut store = self.store.write();
        match store.relationships.get_mut(&key) {
            Some(existing) => {
                for tag in params.tags {
                    if !existing.tags.contains(&tag) {
                        existing.tags.push(tag);
                    }
                }
                existing.metadata.extend(params.metadata);
            }
            None => {
                store.relationships.insert(
                    key,
                    Relationship {
                        id: UUID::new_v4(),
                        source_entity_id: params.source_entity_id,
                        target_entity_id: params.target_entity_id,
                        agent_id: self.agent_id.clone(),
                        tags: params.tags,
                        metadata: params.metadata,
                        created_at: Some(now_ms()),
                    },
                );
            }
        }
        Ok(true)
    }

    async fn update_relationship(&self, relationship: &Relationship) -> Result<()> {
        let key = (
            relationship.source_entity_id.clone(),
            relationship.target_entity_id.clone(),
        );
        let mut store = self.store.write();
        match store.relationships.get_mut(&key) {
            Some(existing) => {
                *existing = relationship.clone();
                Ok(())
            }
            None => bail!("Relationship {} not found", relationship.id),
        }
    }

    async fn get_relationship(
        &self,
        source_entity_id: &UUID,
        target_entity_id: &UUID,
    ) -> Result<Option<Relationship>> {
        Ok(self
            .store
            .read()
            .relationships
            .get(&(source_entity_id.clone(), target_entity_id.clone()))
            .cloned())
    }

    async fn get_relationships(
        &self,
        entity_id: &UUID,
        tags: Option<&[String]>,
    ) -> Result<Vec<Relationship>> {
        let mut found: Vec<Relationship> = self
            .store
            .read()
            .relationships
            .values()
            .filter(|r| r.source_entity_id == *entity_id || r.target_entity_id == *entity_id)
            .filter(|r| tags.map_or(true, |tags| tags.iter().any(|t| r.tags.contains(t))))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    // Cache

    async fn get_cache(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.store.read().cache.get(key).cloned())
    }

    async fn set_cache(&self, key: &str, value: Value) -> Result<bool> {
        self.store.write().cache.insert(key.to_string(), value);
        Ok(true)
    }

    async fn delete_cache(&self, key: &str) -> Result<bool> {
        Ok(self.store.write().cache.remove(key).is_some())
    }

    // Tasks

    async fn create_task(&self, task: &Task) -> Result<UUID> {
        let mut task = task.clone();
        let id = task.id.get_or_insert_with(UUID::new_v4).clone();
        let now = now_ms();
        task.created_at.get_or_insert(now);
        task.updated_at.get_or_insert(now);
        self.store.write().tasks.insert(id.clone(), task);
        Ok(id)
    }

    async fn get_tasks(&self, params: GetTasksParams) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .store
            .read()
            .tasks
            .values()
            .filter(|t| {
                params
                    .room_id
                    .as_ref()
                    .map_or(true, |r| t.room_id.as_ref() == Some(r))
                    && params
                        .entity_id
                        .as_ref()
                        .map_or(true, |e| t.entity_id.as_ref() == Some(e))
                    && params
                        .tags
                        .as_ref()
                        .map_or(true, |tags| tags.iter().all(|tag| t.has_tag(tag)))
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn get_task(&self, id: &UUID) -> Result<Option<Task>> {
        Ok(self.store.read().tasks.get(id).cloned())
    }

    async fn get_tasks_by_name(&self, name: &str) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .store
            .read()
            .tasks
            .values()
            .filter(|t| t.name == name)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn update_task(&self, id: &UUID, task: &Task) -> Result<()> {
        let mut store = self.store.write();
        match store.tasks.get_mut(id) {
            Some(existing) => {
                let mut task = task.clone();
                task.id = Some(id.clone());
                *existing = task;
                Ok(())
            }
            None => bail!("Task {id} not found"),
        }
    }

    async fn delete_task(&self, id: &UUID) -> Result<()> {
        self.store.write().tasks.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::primitives::Content;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_memories_list_newest_first() {
        let adapter = InMemoryDatabaseAdapter::new();
        let room = UUID::new_v4();
        for (i, at) in [10, 30, 20].into_iter().enumerate() {
            let mut memory = Memory::new(UUID::new_v4(), room.clone(), Content::text(i.to_string()));
            memory.created_at = Some(at);
            adapter.create_memory(&memory, "messages", false).await.unwrap();
        }

        let listed = adapter
            .get_memories(GetMemoriesParams {
                table_name: "messages".into(),
                room_id: Some(room),
                count: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let times: Vec<Option<i64>> = listed.iter().map(|m| m.created_at).collect();
        assert_eq!(times, vec![Some(30), Some(20)]);
    }

    #[tokio::test]
    async fn test_search_respects_threshold_and_table() {
        let adapter = InMemoryDatabaseAdapter::new();
        let room = UUID::new_v4();
        for (text, embedding, table) in [
            ("close", vec![1.0, 0.1], "knowledge"),
            ("far", vec![-1.0, 0.0], "knowledge"),
            ("other table", vec![1.0, 0.0], "facts"),
        ] {
            let mut memory = Memory::new(UUID::new_v4(), room.clone(), Content::text(text));
            memory.embedding = Some(embedding);
            adapter.create_memory(&memory, table, false).await.unwrap();
        }

        let found = adapter
            .search_memories(SearchMemoriesParams {
                table_name: "knowledge".into(),
                embedding: vec![1.0, 0.0],
                match_threshold: Some(0.5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(), "close");
        assert!(found[0].similarity.unwrap() > 0.9);
    }

    #[tokio::test]
    async fn test_participant_state() {
        let adapter = InMemoryDatabaseAdapter::new();
        let (room, entity) = (UUID::new_v4(), UUID::new_v4());

        assert!(adapter.add_participant(&entity, &room).await.unwrap());
        assert!(!adapter.add_participant(&entity, &room).await.unwrap());
        adapter
            .set_participant_user_state(&room, &entity, Some(ParticipantUserState::Muted))
            .await
            .unwrap();
        assert_eq!(
            adapter.get_participant_user_state(&room, &entity).await.unwrap(),
            Some(ParticipantUserState::Muted)
        );
        assert!(adapter
            .set_participant_user_state(&UUID::new_v4(), &entity, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_relationship_upsert_merges_tags() {
        let adapter = InMemoryDatabaseAdapter::new();
        let (a, b) = (UUID::new_v4(), UUID::new_v4());
        for tags in [vec!["friend".to_string()], vec!["friend".into(), "colleague".into()]] {
            adapter
                .create_relationship(RelationshipParams {
                    source_entity_id: a.clone(),
                    target_entity_id: b.clone(),
                    tags,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let rel = adapter.get_relationship(&a, &b).await.unwrap().unwrap();
        assert_eq!(rel.tags, vec!["friend".to_string(), "colleague".to_string()]);
        assert_eq!(
            adapter
                .get_relationships(&b, Some(&["colleague".to_string()]))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cache_and_tasks() {
        let adapter = InMemoryDatabaseAdapter::new();
        assert!(adapter.set_cache("k", Value::from(1)).await.unwrap());
        assert_eq!(adapter.get_cache("k").await.unwrap(), Some(Value::from(1)));
        assert!(adapter.delete_cache("k").await.unwrap());
        assert!(!adapter.delete_cache("k").await.unwrap());

        let id = adapter.create_task(&Task::repeating("poll", 100)).await.unwrap();
        let queued = adapter
            .get_tasks(GetTasksParams {
                tags: Some(vec!["queue".into(), "repeat".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        adapter.delete_task(&id).await.unwrap();
        assert!(adapter.get_task(&id).await.unwrap().is_none());
        assert!(adapter.update_task(&id, &Task::new("poll")).await.is_err());
    }
}
