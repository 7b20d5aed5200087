//! Plugin catalog, validation and dependency ordering.

use crate::error::RuntimeError;
use crate::types::plugin::Plugin;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};

/// Factory function type for creating plugin instances.
pub type PluginFactory = Arc<dyn Fn() -> Plugin + Send + Sync>;

/// Named plugin factories a runtime can load from.
///
/// Rust has no dynamic module loader, so embedders register factories up front
/// and characters refer to them by name. Scoped names (`@scope/plugin-x`) and
/// short names (`x`) resolve to the same factory.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        PluginCatalog::default()
    }

    /// Register a factory under `name` and its aliases
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Plugin + Send + Sync + 'static,
    {
        let factory: PluginFactory = Arc::new(factory);
        let short = normalize_plugin_name(name);
        if !name.starts_with('@') {
            self.factories
                .insert(format!("@elizaos/plugin-{name}"), factory.clone());
        }
        self.factories.insert(short, factory.clone());
        self.factories.insert(name.to_string(), factory);
    }

    /// Builder form of [`PluginCatalog::register`]
    pub fn with<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Plugin + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
            || self.factories.contains_key(&normalize_plugin_name(name))
    }

    /// All registered names, aliases included, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build and validate the plugin registered under `name`.
    pub fn load(&self, name: &str) -> Result<Plugin> {
        debug!(plugin = name, "Loading plugin from catalog");
        let factory = self
            .factories
            .get(name)
            .or_else(|| self.factories.get(&normalize_plugin_name(name)))
            .ok_or_else(|| {
                RuntimeError::Configuration(format!(
                    "Plugin '{name}' not found in catalog; register a factory for it first"
                ))
            })?;

        let plugin = factory();
        validate_plugin(&plugin)?;
        Ok(plugin)
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("names", &self.names())
            .finish()
    }
}

/// Validate a plugin's structure
pub fn validate_plugin(plugin: &Plugin) -> Result<()> {
    let invalid = |msg: String| -> anyhow::Error { RuntimeError::InvalidPlugin(msg).into() };

    if plugin.name().is_empty() {
        return Err(invalid("Plugin must have a name".to_string()));
    }
    if plugin.description().is_empty() {
        return Err(invalid(format!(
            "Plugin '{}' must have a description",
            plugin.name()
        )));
    }
    if plugin
        .action_handlers
        .iter()
        .any(|a| a.definition().name.is_empty())
    {
        return Err(invalid(format!(
            "Plugin '{}' has an action without a name",
            plugin.name()
        )));
    }
    if plugin
        .provider_handlers
        .iter()
        .any(|p| p.definition().name.is_empty())
    {
        return Err(invalid(format!(
            "Plugin '{}' has a provider without a name",
            plugin.name()
        )));
    }
    if plugin
        .evaluator_handlers
        .iter()
        .any(|e| e.definition().name.is_empty())
    {
        return Err(invalid(format!(
            "Plugin '{}' has an evaluator without a name",
            plugin.name()
        )));
    }
    if plugin.services.iter().any(|s| s.service_type.is_empty()) {
        return Err(invalid(format!(
            "Plugin '{}' has a service without a type",
            plugin.name()
        )));
    }
    Ok(())
}

/// Normalize a plugin name by extracting the short name from scoped packages
pub fn normalize_plugin_name(name: &str) -> String {
    if let Some(short) = name.strip_prefix("@elizaos/plugin-") {
        return short.to_string();
    }
    if let Some(short) = name
        .strip_prefix('@')
        .and_then(|s| s.split('/').nth(1))
        .and_then(|s| s.strip_prefix("plugin-"))
    {
        return short.to_string();
    }
    name.to_string()
}

/// Order plugins so each comes after its dependencies.
///
/// Dependencies are matched by name or alias among `plugins` and
/// `already_registered`. Input order is kept where dependencies allow it.
/// Later duplicates of a name are dropped.
pub fn resolve_plugin_dependencies(
    plugins: Vec<Plugin>,
    already_registered: &HashSet<String>,
) -> Result<Vec<Plugin>> {
    let mut slots: Vec<Option<Plugin>> = Vec::with_capacity(plugins.len());
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for plugin in plugins {
        if lookup.contains_key(plugin.name()) {
            debug!(plugin = plugin.name(), "Dropping duplicate plugin");
            continue;
        }
        let idx = slots.len();
        lookup.insert(plugin.name().to_string(), idx);
        lookup
            .entry(normalize_plugin_name(plugin.name()))
            .or_insert(idx);
        slots.push(Some(plugin));
    }

    let registered: HashSet<String> = already_registered
        .iter()
        .flat_map(|n| [n.clone(), normalize_plugin_name(n)])
        .collect();

    struct Walk<'a> {
        slots: &'a [Option<Plugin>],
        lookup: &'a HashMap<String, usize>,
        registered: &'a HashSet<String>,
        visited: HashSet<usize>,
        visiting: Vec<usize>,
        order: Vec<usize>,
    }

    impl Walk<'_> {
        fn visit(&mut self, idx: usize) -> Result<()> {
            if self.visited.contains(&idx) {
                return Ok(());
            }
            let slots = self.slots;
            let name = |i: usize| {
                slots[i]
                    .as_ref()
                    .map(|p| p.name().to_string())
                    .unwrap_or_default()
            };
            if let Some(pos) = self.visiting.iter().position(|&i| i == idx) {
                let mut cycle: Vec<String> = self.visiting[pos..].iter().map(|&i| name(i)).collect();
                cycle.push(name(idx));
                let cycle = cycle.join(" -> ");
                error!(cycle = %cycle, "Circular plugin dependency");
                return Err(RuntimeError::DependencyCycle(cycle).into());
            }

            self.visiting.push(idx);
            let deps: Vec<String> = self.slots[idx]
                .as_ref()
                .map(|p| p.dependencies().to_vec())
                .unwrap_or_default();
            for dep in deps {
                let target = self
                    .lookup
                    .get(&dep)
                    .or_else(|| self.lookup.get(&normalize_plugin_name(&dep)))
                    .copied();
                match target {
                    Some(dep_idx) => self.visit(dep_idx)?,
                    None if self.registered.contains(&dep)
                        || self.registered.contains(&normalize_plugin_name(&dep)) => {}
                    None => {
                        return Err(RuntimeError::MissingDependency {
                            plugin: name(idx),
                            dependency: dep,
                        }
                        .into())
                    }
                }
            }
            self.visiting.pop();
            self.visited.insert(idx);
            self.order.push(idx);
            Ok(())
        }
    }

    let mut walk = Walk {
        slots: &slots,
        lookup: &lookup,
        registered: &registered,
        visited: HashSet::new(),
        visiting: Vec::new(),
        order: Vec::new(),
    };
    for idx in 0..slots.len() {
        walk.visit(idx)?;
    }
    let order = walk.order;

    debug!(
        order = ?order
            .iter()
            .filter_map(|&i| slots[i].as_ref().map(|p| p.name().to_string()))
            .collect::<Vec<_>>(),
        "Resolved plugin order"
    );
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(plugins: &[Plugin]) -> Vec<&str> {
        plugins.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_normalize_plugin_name() {
        assert_eq!(normalize_plugin_name("@elizaos/plugin-sql"), "sql");
        assert_eq!(normalize_plugin_name("@acme/plugin-weather"), "weather");
        assert_eq!(normalize_plugin_name("bootstrap"), "bootstrap");
    }

    #[test]
    fn test_dependencies_come_first() {
        let plugins = vec![
            Plugin::new("c", "c").with_dependency("b"),
            Plugin::new("b", "b").with_dependency("a"),
            Plugin::new("a", "a"),
            Plugin::new("d", "d"),
        ];
        let ordered = resolve_plugin_dependencies(plugins, &HashSet::new()).unwrap();
        assert_eq!(names(&ordered), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_scoped_dependency_resolves_short_name() {
        let plugins = vec![
            Plugin::new("app", "app").with_dependency("@elizaos/plugin-sql"),
            Plugin::new("sql", "sql"),
        ];
        let ordered = resolve_plugin_dependencies(plugins, &HashSet::new()).unwrap();
        assert_eq!(names(&ordered), vec!["sql", "app"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let plugins = vec![
            Plugin::new("a", "a").with_dependency("b"),
            Plugin::new("b", "b").with_dependency("a"),
        ];
        let err = resolve_plugin_dependencies(plugins, &HashSet::new()).unwrap_err();
        match err.downcast_ref::<RuntimeError>() {
            Some(RuntimeError::DependencyCycle(cycle)) => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_rejected_unless_registered() {
        let plugins = || vec![Plugin::new("a", "a").with_dependency("ghost")];
        let err = resolve_plugin_dependencies(plugins(), &HashSet::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::MissingDependency { dependency, .. }) if dependency == "ghost"
        ));

        let registered: HashSet<String> = ["ghost".to_string()].into_iter().collect();
        let ordered = resolve_plugin_dependencies(plugins(), &registered).unwrap();
        assert_eq!(names(&ordered), vec!["a"]);
    }

    #[test]
    fn test_catalog_aliases_and_validation() {
        let catalog = PluginCatalog::new()
            .with("weather", || Plugin::new("weather", "Weather lookups"))
            .with("broken", || Plugin::new("broken", ""));

        assert!(catalog.contains("@elizaos/plugin-weather"));
        assert_eq!(
            catalog.load("@elizaos/plugin-weather").unwrap().name(),
            "weather"
        );
        assert!(catalog.load("broken").is_err());
        assert!(catalog.load("missing").is_err());
    }
}
