//! State composition.

use anyhow::Result;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::AgentRuntime;
use crate::error::RuntimeError;
use crate::types::components::{ProviderHandler, ProviderResult};
use crate::types::memory::Memory;
use crate::types::state::State;

/// Sort key: positioned providers first (ascending), then registration order.
fn provider_order(position: Option<i32>, index: usize) -> (bool, i32, usize) {
    (position.is_none(), position.unwrap_or(0), index)
}

impl AgentRuntime {
    /// Compose the state for `message` from the registered providers.
    ///
    /// The default selection is every provider that is neither dynamic nor
    /// private, narrowed to `filter_list` when given; providers named in
    /// `include_list` are always added. Selected providers run concurrently
    /// and their results are merged in position order, so the output does not
    /// depend on completion order. A failing provider contributes nothing.
    ///
    /// Results are cached per message id and merged with later compositions
    /// for the same message until [`AgentRuntime::clear_state_cache`]. The
    /// cache holds a bounded number of messages; the least recently composed
    /// one is evicted first.
    pub async fn compose_state(
        &self,
        message: &Memory,
        include_list: Option<&[String]>,
        filter_list: Option<&[String]>,
    ) -> Result<State> {
        let adapter = self.require_adapter()?;
        if adapter.get_room(&message.room_id).await?.is_none() {
            return Err(RuntimeError::RoomNotFound(message.room_id.clone()).into());
        }

        let registered = self.providers.read().await.all();
        let selected: Vec<(usize, Arc<dyn ProviderHandler>)> = registered
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let def = p.definition();
                let named = |list: Option<&[String]>| {
                    list.is_some_and(|l| l.iter().any(|n| *n == def.name))
                };
                if named(include_list) {
                    return true;
                }
                if def.dynamic || def.private {
                    return false;
                }
                filter_list.map_or(true, |_| named(filter_list))
            })
            .map(|(i, p)| (i, p.clone()))
            .collect();

        let mut ordered = selected;
        ordered.sort_by_key(|(i, p)| provider_order(p.definition().position, *i));

        let previous = match &message.id {
            Some(id) => {
                let cached = self.state_cache.lock().get(id).cloned().unwrap_or_default();
                build_state(&cached, &registered)
            }
            None => State::new(),
        };

        debug!(
            message_id = ?message.id,
            providers = ?ordered.iter().map(|(_, p)| p.definition().name).collect::<Vec<_>>(),
            "Composing state"
        );

        let results = join_all(ordered.iter().map(|(_, provider)| {
            let previous = &previous;
            async move {
                let name = provider.definition().name;
                match provider.get(self, message, previous).await {
                    Ok(result) => (name, result),
                    Err(e) => {
                        warn!(
                            provider = %name,
                            message_id = ?message.id,
                            error = %format!("{e:#}"),
                            "Provider failed"
                        );
                        (name, ProviderResult::empty())
                    }
                }
            }
        }))
        .await;

        let state = match &message.id {
            Some(id) => {
                let mut cache = self.state_cache.lock();
                let mut entry = cache.shift_remove(id).unwrap_or_default();
                entry.extend(results);
                let state = build_state(&entry, &registered);
                cache.insert(id.clone(), entry);
                while cache.len() > self.state_cache_capacity {
                    if let Some((evicted, _)) = cache.shift_remove_index(0) {
                        debug!(message_id = %evicted, "Evicted cached state");
                    }
                }
                state
            }
            None => build_state(&results.into_iter().collect(), &registered),
        };
        Ok(state)
    }

    /// Forget the cached provider results for a message.
    pub fn clear_state_cache(&self, message_id: &crate::types::primitives::UUID) {
        self.state_cache.lock().shift_remove(message_id);
    }

    /// Number of messages with cached provider results
    pub fn cached_state_count(&self) -> usize {
        self.state_cache.lock().len()
    }
}

/// Merge provider results in provider order.
fn build_state(
    results: &HashMap<String, ProviderResult>,
    registered: &[Arc<dyn ProviderHandler>],
) -> State {
    let positions: HashMap<String, (usize, Option<i32>)> = registered
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let def = p.definition();
            (def.name, (i, def.position))
        })
        .collect();

    let mut ordered: Vec<(&String, &ProviderResult)> = results.iter().collect();
    ordered.sort_by_key(|(name, _)| {
        let (index, position) = positions
            .get(name.as_str())
            .copied()
            .unwrap_or((usize::MAX, None));
        (provider_order(position, index), (*name).clone())
    });

    let mut state = State::new();
    let mut sections = Vec::new();
    for (name, result) in ordered {
        state.merge_values(&result.values);
        state.data.insert(
            name.clone(),
            Value::Object(result.data.clone().into_iter().collect()),
        );
        if let Some(text) = result.section() {
            sections.push(text);
        }
    }
    state.text = sections.join("\n\n");
    state.set_value("providers", state.text.clone());
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::components::ProviderDefinition;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Fixed(&'static str, Option<i32>);

    #[async_trait]
    impl ProviderHandler for Fixed {
        fn definition(&self) -> ProviderDefinition {
            ProviderDefinition {
                name: self.0.to_string(),
                position: self.1,
                ..Default::default()
            }
        }

        async fn get(&self, _: &AgentRuntime, _: &Memory, _: &State) -> Result<ProviderResult> {
            Ok(ProviderResult::new(self.0))
        }
    }

    #[test]
    fn test_build_state_orders_by_position_then_registration() {
        let registered: Vec<Arc<dyn ProviderHandler>> = vec![
            Arc::new(Fixed("late", None)),
            Arc::new(Fixed("first", Some(-1))),
            Arc::new(Fixed("second", Some(5))),
            Arc::new(Fixed("later", None)),
        ];
        let results: HashMap<String, ProviderResult> = ["later", "second", "late", "first"]
            .into_iter()
            .map(|n| {
                (
                    n.to_string(),
                    ProviderResult::new(n).with_value("winner", n),
                )
            })
            .collect();

        let state = build_state(&results, &registered);
        assert_eq!(state.text, "first\n\nsecond\n\nlate\n\nlater");
        assert_eq!(state.value("winner"), Some(&Value::from("later")));
        assert_eq!(state.value("providers"), Some(&Value::from(state.text.clone())));
        assert!(state.provider_data("first").is_some());
    }

    #[test]
    fn test_build_state_skips_empty_sections() {
        let registered: Vec<Arc<dyn ProviderHandler>> =
            vec![Arc::new(Fixed("a", None)), Arc::new(Fixed("b", None))];
        let mut results = HashMap::new();
        results.insert("a".to_string(), ProviderResult::empty());
        results.insert("b".to_string(), ProviderResult::new("only"));

        assert_eq!(build_state(&results, &registered).text, "only");
    }
}
