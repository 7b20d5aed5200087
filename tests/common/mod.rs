//! Shared fixtures for integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use eliza_runtime::types::components::{
    ActionDefinition, ActionHandler, ActionResult, HandlerOptions, ResponseEmitter,
};
use eliza_runtime::types::environment::{ChannelType, Room};
use eliza_runtime::types::memory::Memory;
use eliza_runtime::types::primitives::Content;
use eliza_runtime::types::state::State;
use eliza_runtime::{
    AgentRuntime, Character, InMemoryDatabaseAdapter, Plugin, RuntimeOptions, RuntimeSettings,
    UUID,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Long enough that the background scheduler never fires during a test.
pub const QUIET_TICK: Duration = Duration::from_secs(3600);

pub struct Harness {
    pub runtime: Arc<AgentRuntime>,
    pub adapter: Arc<InMemoryDatabaseAdapter>,
}

impl Harness {
    pub async fn new(plugins: Vec<Plugin>) -> Harness {
        Harness::with_character(Character::new("Tester"), plugins).await
    }

    pub async fn with_character(character: Character, plugins: Vec<Plugin>) -> Harness {
        let adapter = Arc::new(InMemoryDatabaseAdapter::new());
        let runtime = AgentRuntime::new(RuntimeOptions {
            character: Some(character),
            adapter: Some(adapter.clone()),
            settings: Some(RuntimeSettings::new()),
            plugins,
            task_tick_interval: Some(QUIET_TICK),
            ..Default::default()
        })
        .await
        .unwrap();
        runtime.initialize().await.unwrap();
        Harness { runtime, adapter }
    }

    /// Create a room and return a user message in it.
    pub async fn message(&self, text: &str) -> Memory {
        let room_id = UUID::new_v4();
        self.runtime
            .get_adapter()
            .unwrap()
            .create_room(&Room::new(room_id.clone(), "test", ChannelType::Dm))
            .await
            .unwrap();
        Memory::message(UUID::new_v4(), room_id, None, Content::text(text))
    }

    /// A response in the same room naming `actions`.
    pub fn response(&self, message: &Memory, actions: &[&str]) -> Memory {
        Memory::message(
            self.runtime.agent_id.clone(),
            message.room_id.clone(),
            Some(self.runtime.agent_id.clone()),
            Content::text("reply").with_actions(actions.iter().copied()),
        )
    }
}

/// Records every invocation into a shared log.
pub struct SpyAction {
    pub name: String,
    pub similes: Vec<String>,
    pub fail: bool,
    pub valid: bool,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl SpyAction {
    pub fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        SpyAction {
            name: name.to_string(),
            similes: Vec::new(),
            fail: false,
            valid: true,
            log: log.clone(),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    pub fn with_simile(mut self, simile: &str) -> Self {
        self.similes.push(simile.to_string());
        self
    }
}

#[async_trait]
impl ActionHandler for SpyAction {
    fn definition(&self) -> ActionDefinition {
        ActionDefinition {
            name: self.name.clone(),
            description: format!("{} spy", self.name),
            similes: self.similes.clone(),
        }
    }

    async fn validate(&self, _: &AgentRuntime, _: &Memory, _: &State) -> bool {
        self.valid
    }

    async fn handle(
        &self,
        _: &AgentRuntime,
        _: &Memory,
        _: &State,
        options: &HandlerOptions,
        callback: Option<&ResponseEmitter>,
    ) -> Result<Option<ActionResult>> {
        let previous = options
            .action_context
            .as_ref()
            .map_or(0, |c| c.previous_results.len());
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, previous));
        if let Some(callback) = callback {
            callback.emit(Content::text(format!("{} ran", self.name)));
        }
        if self.fail {
            bail!("{} exploded", self.name);
        }
        Ok(Some(ActionResult::success(self.name.clone())))
    }
}
