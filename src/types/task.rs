//! Task types: deferred or recurring work bound to a named worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::memory::Memory;
use super::primitives::{Metadata, UUID};
use super::state::State;
use crate::runtime::AgentRuntime;

/// Tag marking a task for the scheduler.
pub const TAG_QUEUE: &str = "queue";
/// Tag marking a recurring task.
pub const TAG_REPEAT: &str = "repeat";
/// Metadata key: repeat interval in milliseconds.
pub const META_UPDATE_INTERVAL: &str = "updateInterval";
/// Metadata key: next execution time in epoch milliseconds.
pub const META_NEXT_RUN_AT: &str = "nextRunAt";

/// Task status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to become due
    #[default]
    Pending,
    /// Currently executing
    InProgress,
    /// Finished (one-shot tasks are usually deleted instead)
    Completed,
    /// Execution failed; not selected again
    Failed,
}

/// A unit of deferred or recurring work.
///
/// The task's `name` is the name of the worker that executes it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<UUID>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Task {
    /// A queued one-shot task, due immediately.
    pub fn new(name: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Task {
            id: Some(UUID::new_v4()),
            name: name.to_string(),
            status: Some(TaskStatus::Pending),
            tags: vec![TAG_QUEUE.to_string()],
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }

    /// A queued one-shot task due at `at_ms`.
    pub fn scheduled(name: &str, at_ms: i64) -> Self {
        let mut task = Task::new(name);
        task.set_next_run_at(at_ms);
        task
    }

    /// A queued repeating task with the given interval, first due immediately.
    pub fn repeating(name: &str, interval_ms: i64) -> Self {
        let mut task = Task::new(name);
        task.tags.push(TAG_REPEAT.to_string());
        task.metadata
            .insert(META_UPDATE_INTERVAL.to_string(), Value::from(interval_ms));
        task
    }

    /// Whether the task carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the task recurs
    pub fn is_repeating(&self) -> bool {
        self.has_tag(TAG_REPEAT)
    }

    /// Repeat interval in milliseconds
    pub fn interval_ms(&self) -> Option<i64> {
        self.metadata.get(META_UPDATE_INTERVAL).and_then(Value::as_i64)
    }

    /// Next execution time in epoch milliseconds
    pub fn next_run_at(&self) -> Option<i64> {
        self.metadata.get(META_NEXT_RUN_AT).and_then(Value::as_i64)
    }

    pub fn set_next_run_at(&mut self, at_ms: i64) {
        self.metadata
            .insert(META_NEXT_RUN_AT.to_string(), Value::from(at_ms));
    }

    /// Due when no next-execution time is set or it has elapsed.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_run_at().map_or(true, |at| at <= now_ms)
    }
}

/// Parameters for listing tasks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTasksParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    /// Tasks must carry every listed tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<UUID>,
}

/// Executes tasks of one name.
#[async_trait]
pub trait TaskWorker: Send + Sync {
    /// Worker name; tasks with this name are routed here
    fn name(&self) -> &str;

    /// Optional gate checked before a task is considered for execution.
    async fn validate(&self, _runtime: &AgentRuntime, _message: &Memory, _state: &State) -> bool {
        true
    }

    /// Run the task. `options` is the task's metadata.
    async fn execute(
        &self,
        runtime: &AgentRuntime,
        options: &Metadata,
        task: &Task,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_queued_and_due() {
        let task = Task::new("cleanup");
        assert!(task.has_tag(TAG_QUEUE));
        assert!(!task.is_repeating());
        assert!(task.is_due(0));
    }

    #[test]
    fn test_scheduled_task_due_time() {
        let task = Task::scheduled("later", 1_000);
        assert!(!task.is_due(999));
        assert!(task.is_due(1_000));
    }

    #[test]
    fn test_repeating_task_metadata() {
        let task = Task::repeating("poll", 5_000);
        assert!(task.is_repeating());
        assert_eq!(task.interval_ms(), Some(5_000));

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["metadata"]["updateInterval"], 5_000);
        assert_eq!(json["status"], "pending");
    }
}
