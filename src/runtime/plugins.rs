//! Plugin registration.
//!
//! A plugin is staged first (init hook, then service starts) and committed
//! into the registries only when staging succeeds, so a failing plugin leaves
//! previously registered plugins untouched. Effects the init hook had
//! outside the registries are not undone when a service then fails to start;
//! the plugin stays unregistered and its init hook runs again on retry.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::AgentRuntime;
use crate::error::RuntimeError;
use crate::plugin::{resolve_plugin_dependencies, validate_plugin};
use crate::types::plugin::Plugin;
use crate::types::service::Service;

impl AgentRuntime {
    /// Register a plugin.
    ///
    /// Registering a name that is already registered is a logged no-op. Every
    /// dependency must already be registered; use
    /// [`AgentRuntime::register_plugins`] to register a set in dependency
    /// order. Registration is serialized, so init hooks must not register
    /// plugins themselves.
    ///
    /// The init hook runs before the plugin's services start. If a service
    /// fails to start, services already started are stopped and nothing is
    /// registered, but whatever the init hook did elsewhere stays done. Init
    /// hooks should therefore be idempotent.
    pub async fn register_plugin(self: &Arc<Self>, plugin: Plugin) -> Result<()> {
        let _guard = self.registration_lock.lock().await;
        self.register_plugin_locked(plugin).await
    }

    /// Register several plugins, dependencies first.
    pub async fn register_plugins(self: &Arc<Self>, plugins: Vec<Plugin>) -> Result<()> {
        let _guard = self.registration_lock.lock().await;
        let registered: HashSet<String> = self.plugin_names().await.into_iter().collect();
        for plugin in resolve_plugin_dependencies(plugins, &registered)? {
            self.register_plugin_locked(plugin).await?;
        }
        Ok(())
    }

    async fn register_plugin_locked(self: &Arc<Self>, mut plugin: Plugin) -> Result<()> {
        validate_plugin(&plugin)?;
        let name = plugin.name().to_string();

        if self.has_plugin(&name).await {
            info!(plugin = %name, "Plugin already registered, skipping");
            return Ok(());
        }

        let registered: HashSet<String> = self.plugin_names().await.into_iter().collect();
        let normalized: HashSet<String> = registered
            .iter()
            .map(|n| crate::plugin::normalize_plugin_name(n))
            .collect();
        for dep in plugin.dependencies() {
            if !registered.contains(dep)
                && !normalized.contains(&crate::plugin::normalize_plugin_name(dep))
            {
                return Err(RuntimeError::MissingDependency {
                    plugin: name,
                    dependency: dep.clone(),
                }
                .into());
            }
        }

        debug!(plugin = %name, "Registering plugin");

        if let Some(init) = plugin.init.clone() {
            init(plugin.config_strings(), self.clone())
                .await
                .map_err(|source| RuntimeError::PluginInit {
                    plugin: name.clone(),
                    source,
                })?;
        }

        let started = self.start_plugin_services(&plugin).await?;

        for action in std::mem::take(&mut plugin.action_handlers) {
            self.register_action(action).await;
        }
        for provider in std::mem::take(&mut plugin.provider_handlers) {
            self.register_provider(provider).await;
        }
        for evaluator in std::mem::take(&mut plugin.evaluator_handlers) {
            self.register_evaluator(evaluator).await;
        }
        for (model_type, handler) in std::mem::take(&mut plugin.model_handlers) {
            self.add_model_handler(model_type, &name, handler).await;
        }
        for (event, handler) in std::mem::take(&mut plugin.events) {
            self.add_event_handler(event, handler).await;
        }
        self.routes
            .write()
            .await
            .extend(std::mem::take(&mut plugin.routes));
        for worker in std::mem::take(&mut plugin.task_workers) {
            self.register_task_worker(worker).await;
        }
        {
            let mut services = self.services.write().await;
            for service in started {
                services.insert(service.service_type().to_string(), service);
            }
        }
        self.plugins.write().await.push(plugin.definition);

        info!(plugin = %name, "Plugin registered");
        Ok(())
    }

    /// Start every service the plugin declares. On failure, services already
    /// started for this plugin are stopped and the error is returned.
    async fn start_plugin_services(
        self: &Arc<Self>,
        plugin: &Plugin,
    ) -> Result<Vec<Arc<dyn Service>>> {
        let mut started: Vec<Arc<dyn Service>> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for registration in &plugin.services {
            let service_type = registration.service_type.as_str();
            if !seen.insert(service_type) || self.has_service(service_type).await {
                stop_all(&started).await;
                return Err(RuntimeError::DuplicateService(service_type.to_string()).into());
            }

            match (registration.start)(self.clone()).await {
                Ok(service) => {
                    debug!(plugin = plugin.name(), service = service_type, "Started service");
                    started.push(service);
                }
                Err(source) => {
                    stop_all(&started).await;
                    return Err(RuntimeError::ServiceStart {
                        service: service_type.to_string(),
                        source,
                    }
                    .into());
                }
            }
        }
        Ok(started)
    }
}

async fn stop_all(services: &[Arc<dyn Service>]) {
    for service in services {
        if let Err(e) = service.stop().await {
            warn!(
                service = service.service_type(),
                error = %format!("{e:#}"),
                "Failed to stop service while rolling back plugin"
            );
        }
    }
}
