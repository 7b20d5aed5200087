//! Name-indexed registry of capability handlers.
//!
//! Entries keep registration order. Lookups resolve by exact name, then by
//! normalized name (lowercase, underscores removed), then through a secondary
//! index from simile to canonical name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::components::{ActionHandler, EvaluatorHandler, ProviderHandler};

/// A handler that can live in a [`Registry`].
pub trait RegistryEntry: Send + Sync {
    fn entry_name(&self) -> String;

    fn entry_similes(&self) -> Vec<String> {
        Vec::new()
    }
}

impl RegistryEntry for dyn ActionHandler {
    fn entry_name(&self) -> String {
        self.definition().name
    }

    fn entry_similes(&self) -> Vec<String> {
        self.definition().similes
    }
}

impl RegistryEntry for dyn ProviderHandler {
    fn entry_name(&self) -> String {
        self.definition().name
    }
}

impl RegistryEntry for dyn EvaluatorHandler {
    fn entry_name(&self) -> String {
        self.definition().name
    }

    fn entry_similes(&self) -> Vec<String> {
        self.definition().similes
    }
}

/// Lowercase with underscores removed, so `SEND_MESSAGE` matches `sendMessage`.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "")
}

pub struct Registry<H: ?Sized + RegistryEntry> {
    entries: Vec<Arc<H>>,
    by_name: HashMap<String, usize>,
    by_normalized: HashMap<String, usize>,
    /// normalized simile -> canonical name
    similes: HashMap<String, String>,
}

impl<H: ?Sized + RegistryEntry> Default for Registry<H> {
    fn default() -> Self {
        Registry {
            entries: Vec::new(),
            by_name: HashMap::new(),
            by_normalized: HashMap::new(),
            similes: HashMap::new(),
        }
    }
}

impl<H: ?Sized + RegistryEntry> Registry<H> {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Add an entry. Returns `false` and leaves the registry unchanged when
    /// the name is already taken.
    pub fn insert(&mut self, entry: Arc<H>) -> bool {
        let name = entry.entry_name();
        if self.by_name.contains_key(&name) {
            return false;
        }
        let idx = self.entries.len();
        self.by_normalized.entry(normalize_name(&name)).or_insert(idx);
        for simile in entry.entry_similes() {
            self.similes
                .entry(normalize_name(&simile))
                .or_insert_with(|| name.clone());
        }
        self.by_name.insert(name, idx);
        self.entries.push(entry);
        true
    }

    /// Exact-name lookup
    pub fn get(&self, name: &str) -> Option<Arc<H>> {
        self.by_name.get(name).map(|&i| self.entries[i].clone())
    }

    /// Resolve a name the way a model might write it: exact, normalized, or simile.
    pub fn resolve(&self, name: &str) -> Option<Arc<H>> {
        if let Some(entry) = self.get(name) {
            return Some(entry);
        }
        let normalized = normalize_name(name);
        if let Some(&i) = self.by_normalized.get(&normalized) {
            return Some(self.entries[i].clone());
        }
        self.similes
            .get(&normalized)
            .and_then(|canonical| self.get(canonical))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entries in registration order
    pub fn all(&self) -> Vec<Arc<H>> {
        self.entries.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.entry_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Named {
        name: &'static str,
        similes: Vec<String>,
    }

    impl RegistryEntry for Named {
        fn entry_name(&self) -> String {
            self.name.to_string()
        }

        fn entry_similes(&self) -> Vec<String> {
            self.similes.clone()
        }
    }

    fn named(name: &'static str, similes: &[&str]) -> Arc<Named> {
        Arc::new(Named {
            name,
            similes: similes.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_resolution_order() {
        let mut registry: Registry<Named> = Registry::new();
        assert!(registry.insert(named("SEND_MESSAGE", &["DM", "whisper"])));
        assert!(registry.insert(named("REPLY", &["respond"])));

        assert_eq!(registry.resolve("SEND_MESSAGE").unwrap().name, "SEND_MESSAGE");
        assert_eq!(registry.resolve("sendMessage").unwrap().name, "SEND_MESSAGE");
        assert_eq!(registry.resolve("WHISPER").unwrap().name, "SEND_MESSAGE");
        assert_eq!(registry.resolve("respond").unwrap().name, "REPLY");
        assert!(registry.resolve("dance").is_none());
        assert!(registry.get("reply").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry: Registry<Named> = Registry::new();
        assert!(registry.insert(named("REPLY", &[])));
        assert!(!registry.insert(named("REPLY", &["again"])));

        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("again").is_none());
    }

    #[test]
    fn test_first_simile_owner_wins() {
        let mut registry: Registry<Named> = Registry::new();
        registry.insert(named("A", &["shared"]));
        registry.insert(named("B", &["shared"]));

        assert_eq!(registry.resolve("shared").unwrap().name, "A");
        assert_eq!(registry.names(), vec!["A".to_string(), "B".to_string()]);
    }
}
