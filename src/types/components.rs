//! Capability components: actions, providers and evaluators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::mpsc;

use super::memory::Memory;
use super::primitives::Content;
use super::state::State;
use crate::runtime::AgentRuntime;

pub type ActionParameters = HashMap<String, JsonValue>;

/// Results of actions that already ran for the same response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_results: Vec<ActionResult>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_context: Option<ActionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ActionParameters>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub values: ActionParameters,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: ActionParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        ActionResult {
            success: true,
            text: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ActionResult {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// One provider's contribution to a composed state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub values: HashMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, JsonValue>,
}

impl ProviderResult {
    pub fn new(text: impl Into<String>) -> Self {
        ProviderResult {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Contribution of a provider that failed or had nothing to say
    pub fn empty() -> Self {
        ProviderResult::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Text, if present and non-empty
    pub fn section(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    /// Alternative names the action can be invoked by
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similes: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Excluded from default composition; only runs when named explicitly
    #[serde(default)]
    pub dynamic: bool,
    /// Sort key, ascending; unpositioned providers run after positioned ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    /// Like `dynamic`, and additionally hidden from provider listings
    #[serde(default)]
    pub private: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorDefinition {
    pub name: String,
    pub description: String,
    /// Runs without consulting `validate`
    #[serde(default)]
    pub always_run: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similes: Vec<String>,
}

/// Multi-shot sink handlers use to emit outward responses.
///
/// Every emitted [`Content`] is delivered to the receiver half in order; the
/// pipeline never deduplicates.
#[derive(Clone, Debug)]
pub struct ResponseEmitter {
    tx: mpsc::UnboundedSender<Content>,
}

impl ResponseEmitter {
    /// Create an emitter and the receiver its responses arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Content>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResponseEmitter { tx }, rx)
    }

    /// Emit a response. Returns `false` once the receiver is gone.
    pub fn emit(&self, content: Content) -> bool {
        self.tx.send(content).is_ok()
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn definition(&self) -> ActionDefinition;

    async fn validate(&self, runtime: &AgentRuntime, message: &Memory, state: &State) -> bool;

    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Memory,
        state: &State,
        options: &HandlerOptions,
        callback: Option<&ResponseEmitter>,
    ) -> anyhow::Result<Option<ActionResult>>;
}

#[async_trait]
pub trait ProviderHandler: Send + Sync {
    fn definition(&self) -> ProviderDefinition;

    async fn get(
        &self,
        runtime: &AgentRuntime,
        message: &Memory,
        state: &State,
    ) -> anyhow::Result<ProviderResult>;
}

#[async_trait]
pub trait EvaluatorHandler: Send + Sync {
    fn definition(&self) -> EvaluatorDefinition;

    async fn validate(&self, runtime: &AgentRuntime, message: &Memory, state: &State) -> bool;

    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Memory,
        state: &State,
        callback: Option<&ResponseEmitter>,
        responses: &[Memory],
    ) -> anyhow::Result<Option<ActionResult>>;
}
