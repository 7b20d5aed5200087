//! Plugin types: the unit that bundles capabilities into a runtime.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::components::{ActionHandler, EvaluatorHandler, ProviderHandler};
use super::events::{EventHandler, EventPayload};
use super::model::ModelType;
use super::service::ServiceRegistration;
use super::task::TaskWorker;
use crate::runtime::AgentRuntime;

/// HTTP method types for routes
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    /// Static file serving
    Static,
}

/// Route definition for HTTP endpoints
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    #[serde(rename = "type")]
    pub method: HttpMethod,
    pub path: String,
    /// File path for static routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    /// Required for public routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Handles a request body for a route and returns the response body.
pub type RouteHandler =
    Arc<dyn Fn(Value, Arc<AgentRuntime>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A route and its optional handler. Serving HTTP is left to the embedder.
#[derive(Clone)]
pub struct Route {
    pub definition: RouteDefinition,
    pub handler: Option<RouteHandler>,
}

/// Model handler: JSON params in, JSON result out.
pub type ModelHandlerFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Plugin init hook, receiving the plugin's config rendered as strings.
pub type PluginInitFn = Arc<
    dyn Fn(HashMap<String, String>, Arc<AgentRuntime>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Serializable plugin metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDefinition {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, Value>,
    /// Names of plugins that must be registered first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// A plugin with its handlers
#[derive(Default)]
pub struct Plugin {
    pub definition: PluginDefinition,
    pub action_handlers: Vec<Arc<dyn ActionHandler>>,
    pub provider_handlers: Vec<Arc<dyn ProviderHandler>>,
    pub evaluator_handlers: Vec<Arc<dyn EvaluatorHandler>>,
    pub model_handlers: Vec<(ModelType, ModelHandlerFn)>,
    pub services: Vec<ServiceRegistration>,
    pub events: Vec<(String, EventHandler)>,
    pub routes: Vec<Route>,
    pub task_workers: Vec<Arc<dyn TaskWorker>>,
    pub init: Option<PluginInitFn>,
}

impl Plugin {
    pub fn new(name: &str, description: &str) -> Self {
        Plugin {
            definition: PluginDefinition {
                name: name.to_string(),
                description: description.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.definition.dependencies
    }

    pub fn with_dependency(mut self, name: &str) -> Self {
        self.definition.dependencies.push(name.to_string());
        self
    }

    pub fn with_config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.definition.config.insert(key.to_string(), value.into());
        self
    }

    pub fn with_action(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.action_handlers.push(handler);
        self
    }

    pub fn with_provider(mut self, handler: Arc<dyn ProviderHandler>) -> Self {
        self.provider_handlers.push(handler);
        self
    }

    pub fn with_evaluator(mut self, handler: Arc<dyn EvaluatorHandler>) -> Self {
        self.evaluator_handlers.push(handler);
        self
    }

    pub fn with_model<F, Fut>(mut self, model_type: ModelType, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.model_handlers
            .push((model_type, Arc::new(move |params| Box::pin(handler(params)))));
        self
    }

    pub fn with_service(mut self, service: ServiceRegistration) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_event<F, Fut>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.events.push((
            event.to_string(),
            Arc::new(move |payload| Box::pin(handler(payload))),
        ));
        self
    }

    pub fn with_routes(mut self, routes: Vec<RouteDefinition>) -> Self {
        self.routes.extend(routes.into_iter().map(|definition| Route {
            definition,
            handler: None,
        }));
        self
    }

    pub fn with_route(mut self, definition: RouteDefinition, handler: RouteHandler) -> Self {
        self.routes.push(Route {
            definition,
            handler: Some(handler),
        });
        self
    }

    pub fn with_task_worker(mut self, worker: Arc<dyn TaskWorker>) -> Self {
        self.task_workers.push(worker);
        self
    }

    pub fn with_init<F, Fut>(mut self, init: F) -> Self
    where
        F: Fn(HashMap<String, String>, Arc<AgentRuntime>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.init = Some(Arc::new(move |config, runtime| {
            Box::pin(init(config, runtime))
        }));
        self
    }

    /// Config values rendered as strings for the init hook.
    pub fn config_strings(&self) -> HashMap<String, String> {
        self.definition
            .config
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("definition", &self.definition)
            .field("actions", &self.action_handlers.len())
            .field("providers", &self.provider_handlers.len())
            .field("evaluators", &self.evaluator_handlers.len())
            .field("services", &self.services)
            .field("task_workers", &self.task_workers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_definition_serialization() {
        let plugin = Plugin::new("test-plugin", "A test plugin").with_dependency("other-plugin");

        let json = serde_json::to_string(&plugin.definition).unwrap();
        assert!(json.contains("\"name\":\"test-plugin\""));
        assert!(json.contains("\"dependencies\":[\"other-plugin\"]"));
        assert!(!json.contains("config"));
    }

    #[test]
    fn test_route_definition_serialization() {
        let route = RouteDefinition {
            method: HttpMethod::Get,
            path: "/api/test".to_string(),
            file_path: None,
            public: Some(true),
            name: Some("Test Route".to_string()),
        };

        let json = serde_json::to_string(&route).unwrap();
        assert!(json.contains("\"type\":\"GET\""));
        assert!(json.contains("\"path\":\"/api/test\""));
    }

    #[test]
    fn test_config_strings_unquotes_strings() {
        let plugin = Plugin::new("p", "d")
            .with_config("API_URL", "http://localhost")
            .with_config("RETRIES", 3);

        let config = plugin.config_strings();
        assert_eq!(config["API_URL"], "http://localhost");
        assert_eq!(config["RETRIES"], "3");
    }

    #[test]
    fn test_debug_shows_definition_not_handlers() {
        let plugin = Plugin::new("weather", "Weather lookups").with_dependency("http");
        let rendered = format!("{plugin:?}");
        assert!(rendered.contains("weather"));
        assert!(rendered.contains("http"));
        assert!(rendered.contains("actions: 0"));
    }
}
