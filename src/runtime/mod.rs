//! Agent runtime: owns every registry and drives the message pipelines.
//!
//! One [`AgentRuntime`] per agent. It is created with [`AgentRuntime::new`],
//! shared as `Arc<AgentRuntime>`, and brought up with
//! [`AgentRuntime::initialize`]. Registries are mutated during plugin
//! registration and read-shared afterwards; handlers are cloned out of their
//! locks before being awaited.

mod actions;
mod connection;
mod evaluators;
mod knowledge;
mod plugins;
pub mod registry;
mod state;

pub use connection::ConnectionParams;
pub use knowledge::{KnowledgeDocument, KnowledgeOptions};
pub use registry::{Registry, RegistryEntry};

use anyhow::{Context, Result};
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;
use crate::logging::LogLevel;
use crate::plugin::PluginCatalog;
use crate::semaphore::Semaphore;
use crate::settings::{RuntimeSettings, SettingValue};
use crate::types::agent::Character;
use crate::types::components::{
    ActionDefinition, ActionHandler, EvaluatorDefinition, EvaluatorHandler, ProviderDefinition,
    ProviderHandler, ProviderResult,
};
use crate::types::database::{DatabaseAdapter, GetMemoriesParams};
use crate::types::events::{EventHandler, EventPayload};
use crate::types::memory::Memory;
use crate::types::model::ModelType;
use crate::types::plugin::{ModelHandlerFn, Plugin, PluginDefinition, Route, RouteDefinition};
use crate::types::primitives::{string_to_uuid, UUID};
use crate::types::service::Service;
use crate::types::task::{Task, TaskWorker};

/// Default number of recent messages providers should consider
pub const DEFAULT_CONVERSATION_LENGTH: usize = 32;
/// Default task scheduler tick
pub const DEFAULT_TASK_TICK: Duration = Duration::from_secs(1);
/// Default bound on concurrent knowledge embedding calls
pub const DEFAULT_KNOWLEDGE_CONCURRENCY: usize = 10;
/// Default number of messages whose provider results stay cached
pub const DEFAULT_STATE_CACHE_CAPACITY: usize = 256;

/// Runtime options for creating an AgentRuntime
#[derive(Default)]
pub struct RuntimeOptions {
    /// Character configuration (a default character when absent)
    pub character: Option<Character>,
    /// Agent ID; derived from the character when not provided
    pub agent_id: Option<UUID>,
    /// Plugins registered during `initialize()`
    pub plugins: Vec<Plugin>,
    /// Factories for the plugins the character names
    pub catalog: PluginCatalog,
    /// Database adapter
    pub adapter: Option<Arc<dyn DatabaseAdapter>>,
    /// Settings store; seeded from the environment when absent
    pub settings: Option<RuntimeSettings>,
    /// Log level for the runtime. Defaults to Error.
    pub log_level: LogLevel,
    pub conversation_length: Option<usize>,
    /// Task scheduler tick interval
    pub task_tick_interval: Option<Duration>,
    /// Permits of the knowledge ingestion semaphore
    pub knowledge_concurrency: Option<usize>,
    /// Messages kept in the state cache before the oldest is evicted
    pub state_cache_capacity: Option<usize>,
}

/// A model handler and the plugin that registered it.
#[derive(Clone)]
pub struct ModelRegistration {
    pub provider: String,
    pub handler: ModelHandlerFn,
}

#[derive(Clone, Debug)]
struct RunContext {
    run_id: UUID,
    room_id: Option<UUID>,
}

/// The core runtime for an agent
pub struct AgentRuntime {
    /// Agent ID
    pub agent_id: UUID,
    character: Character,
    adapter: Option<Arc<dyn DatabaseAdapter>>,
    actions: RwLock<Registry<dyn ActionHandler>>,
    providers: RwLock<Registry<dyn ProviderHandler>>,
    evaluators: RwLock<Registry<dyn EvaluatorHandler>>,
    /// Definitions of registered plugins, in registration order
    plugins: RwLock<Vec<PluginDefinition>>,
    /// Plugins provided at construction time (registered during `initialize()`)
    initial_plugins: Mutex<Vec<Plugin>>,
    catalog: PluginCatalog,
    events: RwLock<HashMap<String, Vec<EventHandler>>>,
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    /// Per model type, in registration order; the last entry serves calls
    models: RwLock<HashMap<ModelType, Vec<ModelRegistration>>>,
    routes: RwLock<Vec<Route>>,
    task_workers: RwLock<HashMap<String, Arc<dyn TaskWorker>>>,
    settings: RwLock<RuntimeSettings>,
    /// Provider results per message id, least recently composed first
    state_cache: Mutex<IndexMap<UUID, HashMap<String, ProviderResult>>>,
    state_cache_capacity: usize,
    knowledge_semaphore: Semaphore,
    /// Serializes plugin registration
    registration_lock: tokio::sync::Mutex<()>,
    current_run: Mutex<Option<RunContext>>,
    conversation_length: usize,
    task_tick: Duration,
    log_level: LogLevel,
    initialized: AtomicBool,
}

impl AgentRuntime {
    /// Create a new AgentRuntime
    pub async fn new(opts: RuntimeOptions) -> Result<Arc<Self>> {
        let character = opts.character.unwrap_or_default();
        crate::character::validate_character(&character)?;

        let agent_id = character
            .id
            .clone()
            .or(opts.agent_id)
            .unwrap_or_else(|| string_to_uuid(&character.name));

        info!(
            agent_id = %agent_id,
            name = %character.name,
            log_level = ?opts.log_level,
            "Creating AgentRuntime"
        );

        let runtime = AgentRuntime {
            agent_id,
            character,
            adapter: opts.adapter,
            actions: RwLock::new(Registry::new()),
            providers: RwLock::new(Registry::new()),
            evaluators: RwLock::new(Registry::new()),
            plugins: RwLock::new(Vec::new()),
            initial_plugins: Mutex::new(opts.plugins),
            catalog: opts.catalog,
            events: RwLock::new(HashMap::new()),
            services: RwLock::new(HashMap::new()),
            models: RwLock::new(HashMap::new()),
            routes: RwLock::new(Vec::new()),
            task_workers: RwLock::new(HashMap::new()),
            settings: RwLock::new(opts.settings.unwrap_or_else(RuntimeSettings::from_env)),
            state_cache: Mutex::new(IndexMap::new()),
            state_cache_capacity: opts
                .state_cache_capacity
                .unwrap_or(DEFAULT_STATE_CACHE_CAPACITY)
                .max(1),
            knowledge_semaphore: Semaphore::new(
                opts.knowledge_concurrency
                    .unwrap_or(DEFAULT_KNOWLEDGE_CONCURRENCY)
                    .max(1),
            ),
            registration_lock: tokio::sync::Mutex::new(()),
            current_run: Mutex::new(None),
            conversation_length: opts
                .conversation_length
                .unwrap_or(DEFAULT_CONVERSATION_LENGTH),
            task_tick: opts.task_tick_interval.unwrap_or(DEFAULT_TASK_TICK),
            log_level: opts.log_level,
            initialized: AtomicBool::new(false),
        };

        Ok(Arc::new(runtime))
    }

    /// Initialize the runtime.
    ///
    /// Initializes the adapter, registers the built-in core plugin, loads the
    /// character's plugins from the catalog together with the plugins passed
    /// in [`RuntimeOptions`], registers them in dependency order, then ingests
    /// the character's knowledge. Calling it again is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!(agent_id = %self.agent_id, "AgentRuntime already initialized");
            return Ok(());
        }
        info!(agent_id = %self.agent_id, "Initializing AgentRuntime");

        let result = self.initialize_inner().await;
        if result.is_err() {
            self.initialized.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn initialize_inner(self: &Arc<Self>) -> Result<()> {
        if let Some(adapter) = &self.adapter {
            adapter
                .init()
                .await
                .context("Failed to initialize database")?;
        }

        self.register_plugin(crate::services::core_plugin(self.task_tick))
            .await?;

        let mut plugins = Vec::new();
        for name in &self.character.plugins {
            let plugin = self
                .catalog
                .load(name)
                .with_context(|| format!("Failed to load plugin '{name}'"))?;
            plugins.push(plugin);
        }
        plugins.extend(std::mem::take(&mut *self.initial_plugins.lock()));
        self.register_plugins(plugins).await?;

        if !self.character.knowledge.is_empty() {
            let items = self.character.knowledge.clone();
            self.process_character_knowledge(&items).await;
        }

        info!(agent_id = %self.agent_id, "AgentRuntime initialized successfully");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// The character this runtime was built from
    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn conversation_length(&self) -> usize {
        self.conversation_length
    }

    /// Named prompt template from the character
    pub fn template(&self, name: &str) -> Option<&str> {
        self.character.templates.get(name).map(String::as_str)
    }

    /// Get a reference to the database adapter (if any)
    pub fn get_adapter(&self) -> Option<&Arc<dyn DatabaseAdapter>> {
        self.adapter.as_ref()
    }

    /// The database adapter, or [`RuntimeError::NoAdapter`]
    pub fn require_adapter(&self) -> Result<&Arc<dyn DatabaseAdapter>> {
        self.adapter
            .as_ref()
            .ok_or_else(|| RuntimeError::NoAdapter.into())
    }

    /// Semaphore bounding concurrent knowledge ingestion
    pub fn knowledge_semaphore(&self) -> &Semaphore {
        &self.knowledge_semaphore
    }

    // Component registration outside of plugins

    /// Register an action. Returns `false` if the name is taken.
    pub async fn register_action(&self, action: Arc<dyn ActionHandler>) -> bool {
        let name = action.definition().name;
        let added = self.actions.write().await.insert(action);
        if added {
            debug!(action = %name, "Registered action");
        } else {
            warn!(action = %name, "Action already registered, skipping");
        }
        added
    }

    /// Register a provider. Returns `false` if the name is taken.
    pub async fn register_provider(&self, provider: Arc<dyn ProviderHandler>) -> bool {
        let name = provider.definition().name;
        let added = self.providers.write().await.insert(provider);
        if added {
            debug!(provider = %name, "Registered provider");
        } else {
            warn!(provider = %name, "Provider already registered, skipping");
        }
        added
    }

    /// Register an evaluator. Returns `false` if the name is taken.
    pub async fn register_evaluator(&self, evaluator: Arc<dyn EvaluatorHandler>) -> bool {
        let name = evaluator.definition().name;
        let added = self.evaluators.write().await.insert(evaluator);
        if added {
            debug!(evaluator = %name, "Registered evaluator");
        } else {
            warn!(evaluator = %name, "Evaluator already registered, skipping");
        }
        added
    }

    /// Register the worker for tasks named `worker.name()`, replacing any previous one.
    pub async fn register_task_worker(&self, worker: Arc<dyn TaskWorker>) {
        let name = worker.name().to_string();
        if self
            .task_workers
            .write()
            .await
            .insert(name.clone(), worker)
            .is_some()
        {
            warn!(worker = %name, "Replaced existing task worker");
        } else {
            debug!(worker = %name, "Registered task worker");
        }
    }

    pub async fn get_task_worker(&self, name: &str) -> Option<Arc<dyn TaskWorker>> {
        self.task_workers.read().await.get(name).cloned()
    }

    pub async fn get_action(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.read().await.resolve(name)
    }

    pub async fn get_provider(&self, name: &str) -> Option<Arc<dyn ProviderHandler>> {
        self.providers.read().await.get(name)
    }

    pub async fn list_action_definitions(&self) -> Vec<ActionDefinition> {
        self.actions
            .read()
            .await
            .all()
            .iter()
            .map(|a| a.definition())
            .collect()
    }

    /// Provider definitions, private providers excluded
    pub async fn list_provider_definitions(&self) -> Vec<ProviderDefinition> {
        self.providers
            .read()
            .await
            .all()
            .iter()
            .map(|p| p.definition())
            .filter(|d| !d.private)
            .collect()
    }

    pub async fn list_evaluator_definitions(&self) -> Vec<EvaluatorDefinition> {
        self.evaluators
            .read()
            .await
            .all()
            .iter()
            .map(|e| e.definition())
            .collect()
    }

    /// Names of registered plugins, in registration order
    pub async fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub async fn has_plugin(&self, name: &str) -> bool {
        self.plugins.read().await.iter().any(|p| p.name == name)
    }

    /// Route definitions registered by plugins
    pub async fn list_routes(&self) -> Vec<RouteDefinition> {
        self.routes
            .read()
            .await
            .iter()
            .map(|r| r.definition.clone())
            .collect()
    }

    /// Invoke the handler registered for `path`, if it has one.
    pub async fn handle_route(self: &Arc<Self>, path: &str, body: Value) -> Result<Option<Value>> {
        let handler = self
            .routes
            .read()
            .await
            .iter()
            .find(|r| r.definition.path == path)
            .and_then(|r| r.handler.clone());
        match handler {
            Some(handler) => Ok(Some(handler(body, self.clone()).await?)),
            None => Ok(None),
        }
    }

    // Services

    /// Register a long-running service under its type. A second service of
    /// the same type is rejected.
    pub async fn register_service(&self, service: Arc<dyn Service>) -> Result<()> {
        let service_type = service.service_type().to_string();
        let mut services = self.services.write().await;
        if services.contains_key(&service_type) {
            return Err(RuntimeError::DuplicateService(service_type).into());
        }
        debug!(service = %service_type, "Registered service");
        services.insert(service_type, service);
        Ok(())
    }

    pub async fn get_service(&self, service_type: &str) -> Option<Arc<dyn Service>> {
        self.services.read().await.get(service_type).cloned()
    }

    /// Get a service downcast to its concrete type
    pub async fn get_service_as<T: Any + Send + Sync>(&self, service_type: &str) -> Option<Arc<T>> {
        let service = self.get_service(service_type).await?;
        service.as_any().downcast::<T>().ok()
    }

    pub async fn has_service(&self, service_type: &str) -> bool {
        self.services.read().await.contains_key(service_type)
    }

    // Models

    /// Register a model handler. The most recent registration for a type
    /// serves calls; earlier ones stay listed for inspection.
    pub async fn register_model<F, Fut>(&self, model_type: ModelType, provider: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.add_model_handler(
            model_type,
            provider,
            Arc::new(move |params| Box::pin(handler(params))),
        )
        .await;
    }

    pub async fn add_model_handler(&self, model_type: ModelType, provider: &str, handler: ModelHandlerFn) {
        self.models
            .write()
            .await
            .entry(model_type)
            .or_default()
            .push(ModelRegistration {
                provider: provider.to_string(),
                handler,
            });
        debug!(model_type = %model_type, provider, "Registered model handler");
    }

    /// Providers registered for a model type, oldest first
    pub async fn model_providers(&self, model_type: ModelType) -> Vec<String> {
        self.models
            .read()
            .await
            .get(&model_type)
            .map(|regs| regs.iter().map(|r| r.provider.clone()).collect())
            .unwrap_or_default()
    }

    /// The handler that currently serves `model_type`
    pub async fn get_model(&self, model_type: ModelType) -> Option<ModelHandlerFn> {
        self.models
            .read()
            .await
            .get(&model_type)
            .and_then(|regs| regs.last())
            .map(|r| r.handler.clone())
    }

    /// Call the most recently registered handler for `model_type`.
    pub async fn use_model(&self, model_type: ModelType, params: Value) -> Result<Value> {
        let handler = self
            .get_model(model_type)
            .await
            .ok_or(RuntimeError::ModelNotFound(model_type))?;
        debug!(model_type = %model_type, "Calling model");
        handler(params)
            .await
            .with_context(|| format!("Model {model_type} failed"))
    }

    // Events

    /// Add a handler for an event name
    pub async fn register_event<F, Fut>(&self, event: impl AsRef<str>, handler: F)
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.add_event_handler(event, Arc::new(move |payload| Box::pin(handler(payload))))
            .await;
    }

    pub async fn add_event_handler(&self, event: impl AsRef<str>, handler: EventHandler) {
        self.events
            .write()
            .await
            .entry(event.as_ref().to_string())
            .or_default()
            .push(handler);
    }

    /// Run every handler of `event` concurrently and wait for all of them.
    /// Handler errors are logged, never returned.
    pub async fn emit_event(&self, event: impl AsRef<str>, payload: EventPayload) {
        let name = event.as_ref();
        let handlers: Vec<EventHandler> = match self.events.read().await.get(name) {
            Some(handlers) => handlers.clone(),
            None => return,
        };

        let results = join_all(handlers.iter().map(|h| h(payload.clone()))).await;
        for err in results.into_iter().filter_map(Result::err) {
            error!(event = name, error = %format!("{err:#}"), "Event handler failed");
        }
    }

    /// Emit several events with the same payload, one name after another
    pub async fn emit_events<S: AsRef<str>>(&self, events: &[S], payload: EventPayload) {
        for event in events {
            self.emit_event(event, payload.clone()).await;
        }
    }

    // Settings

    /// Look up a setting: runtime overrides, then `character.secrets`,
    /// `character.settings`, `character.settings.secrets`, then the
    /// environment baseline.
    pub async fn get_setting(&self, key: &str) -> Option<SettingValue> {
        let settings = self.settings.read().await;
        if settings.has_override(key) {
            return settings.get(key);
        }

        let from_character = self
            .character
            .secrets
            .get(key)
            .or_else(|| self.character.settings.get(key))
            .or_else(|| self.character.nested_secret(key))
            .and_then(SettingValue::from_json);
        if let Some(value) = from_character {
            return Some(value.normalized());
        }

        settings.get(key)
    }

    /// Write a runtime override. Secret values are encrypted at rest and
    /// redacted from debug output.
    pub async fn set_setting(&self, key: &str, value: SettingValue, secret: bool) -> Result<()> {
        self.settings.write().await.set(key, value, secret)?;
        debug!(key, secret, "Setting updated");
        Ok(())
    }

    // Runs

    /// Start a new run
    pub fn start_run(&self, room_id: Option<&UUID>) -> UUID {
        let run_id = UUID::new_v4();
        *self.current_run.lock() = Some(RunContext {
            run_id: run_id.clone(),
            room_id: room_id.cloned(),
        });
        debug!(run_id = %run_id, room_id = ?room_id, "Started run");
        run_id
    }

    /// End the current run
    pub fn end_run(&self) {
        if let Some(run) = self.current_run.lock().take() {
            debug!(run_id = %run.run_id, "Ended run");
        }
    }

    /// Current run id, starting a run when none is active
    pub fn get_current_run_id(&self) -> UUID {
        let mut current = self.current_run.lock();
        match &*current {
            Some(run) => run.run_id.clone(),
            None => {
                let run_id = UUID::new_v4();
                *current = Some(RunContext {
                    run_id: run_id.clone(),
                    room_id: None,
                });
                run_id
            }
        }
    }

    /// Room of the current run, if any
    pub fn get_current_room_id(&self) -> Option<UUID> {
        self.current_run.lock().as_ref().and_then(|r| r.room_id.clone())
    }

    // Persistence shortcuts

    pub async fn create_memory(&self, memory: &Memory, table_name: &str, unique: bool) -> Result<UUID> {
        self.require_adapter()?
            .create_memory(memory, table_name, unique)
            .await
    }

    pub async fn get_memories(&self, params: GetMemoriesParams) -> Result<Vec<Memory>> {
        self.require_adapter()?.get_memories(params).await
    }

    pub async fn create_task(&self, task: &Task) -> Result<UUID> {
        self.require_adapter()?.create_task(task).await
    }

    /// Stop the runtime
    pub async fn stop(&self) -> Result<()> {
        info!(agent_id = %self.agent_id, "Stopping AgentRuntime");

        let services: Vec<(String, Arc<dyn Service>)> = self
            .services
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, service) in services {
            if let Err(e) = service.stop().await {
                error!(service = %name, error = %format!("{e:#}"), "Failed to stop service");
            }
        }

        if let Some(adapter) = &self.adapter {
            adapter.close().await.context("Failed to close database")?;
        }

        info!(agent_id = %self.agent_id, "AgentRuntime stopped");
        Ok(())
    }
}
