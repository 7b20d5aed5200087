//! Event bus types: event names, payloads and handlers.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::environment::{Entity, Room, World};
use super::memory::Memory;
use super::primitives::{Content, UUID};

/// Lifecycle events the runtime and platform plugins emit.
///
/// Plugins may also register and emit events under custom names; the bus is
/// keyed by [`EventType::as_str`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Agent joined a world
    WorldJoined,
    /// Agent connected to a world
    WorldConnected,
    /// Agent left a world
    WorldLeft,
    /// Entity joined
    EntityJoined,
    /// Entity left
    EntityLeft,
    /// Message received
    MessageReceived,
    /// Message sent
    MessageSent,
    /// Run started
    RunStarted,
    /// Run ended
    RunEnded,
    /// Run timed out
    RunTimeout,
    /// Action started
    ActionStarted,
    /// Action completed
    ActionCompleted,
    /// Evaluator started
    EvaluatorStarted,
    /// Evaluator completed
    EvaluatorCompleted,
}

impl EventType {
    /// Bus key, e.g. `ACTION_STARTED`
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::WorldJoined => "WORLD_JOINED",
            EventType::WorldConnected => "WORLD_CONNECTED",
            EventType::WorldLeft => "WORLD_LEFT",
            EventType::EntityJoined => "ENTITY_JOINED",
            EventType::EntityLeft => "ENTITY_LEFT",
            EventType::MessageReceived => "MESSAGE_RECEIVED",
            EventType::MessageSent => "MESSAGE_SENT",
            EventType::RunStarted => "RUN_STARTED",
            EventType::RunEnded => "RUN_ENDED",
            EventType::RunTimeout => "RUN_TIMEOUT",
            EventType::ActionStarted => "ACTION_STARTED",
            EventType::ActionCompleted => "ACTION_COMPLETED",
            EventType::EvaluatorStarted => "EVALUATOR_STARTED",
            EventType::EvaluatorCompleted => "EVALUATOR_COMPLETED",
        }
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to every handler of an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Source of the event
    pub source: String,
    /// Event-specific fields
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl EventPayload {
    pub fn new(source: impl Into<String>) -> Self {
        EventPayload {
            source: source.into(),
            extra: HashMap::new(),
        }
    }

    /// Add a field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Read a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Flatten a typed payload into the generic form.
    pub fn from_typed<T: Serialize>(source: impl Into<String>, typed: &T) -> Self {
        let extra = match serde_json::to_value(typed) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        EventPayload {
            source: source.into(),
            extra,
        }
    }
}

/// Async event handler. Errors are logged by the bus, never propagated.
pub type EventHandler =
    Arc<dyn Fn(EventPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Fields of `WORLD_JOINED` / `WORLD_CONNECTED`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldPayload {
    pub world: World,
    pub rooms: Vec<Room>,
    pub entities: Vec<Entity>,
}

/// Fields of message events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub message: Memory,
}

/// Run status
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run started
    Started,
    /// Run completed
    Completed,
    /// Run timed out
    Timeout,
}

/// Fields of run events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEventPayload {
    pub run_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UUID>,
    pub status: RunStatus,
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// Fields of `ACTION_STARTED` / `ACTION_COMPLETED`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEventPayload {
    pub action_name: String,
    pub room_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<UUID>,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fields of `EVALUATOR_STARTED` / `EVALUATOR_COMPLETED`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorEventPayload {
    pub evaluator_name: String,
    pub room_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_serialization_matches_bus_key() {
        for event in [
            EventType::MessageReceived,
            EventType::ActionCompleted,
            EventType::RunTimeout,
        ] {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }

    #[test]
    fn test_typed_payload_flattens() {
        let typed = EvaluatorEventPayload {
            evaluator_name: "reflection".to_string(),
            room_id: UUID::default_uuid(),
            message_id: None,
            completed: Some(true),
            error: None,
        };
        let payload = EventPayload::from_typed("runtime", &typed);
        assert_eq!(payload.source, "runtime");
        assert_eq!(payload.get("evaluatorName"), Some(&Value::from("reflection")));
        assert_eq!(payload.get("completed"), Some(&Value::Bool(true)));
        assert!(payload.get("error").is_none());
    }
}
