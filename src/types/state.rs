//! Composed per-message state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Snapshot of provider outputs for one message.
///
/// `values` is flat for template interpolation, `data` holds each provider's
/// structured payload under the provider's name, and `text` is the formatted
/// context assembled from provider sections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default)]
    pub values: HashMap<String, Value>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub text: String,
}

impl State {
    /// Empty state
    pub fn new() -> Self {
        State::default()
    }

    /// State carrying only text
    pub fn with_text(text: impl Into<String>) -> Self {
        State {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Look up a flat value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up the payload a provider contributed
    pub fn provider_data(&self, provider: &str) -> Option<&Value> {
        self.data.get(provider)
    }

    /// Set a flat value, replacing any previous one
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Merge values; keys in `other` override existing keys
    pub fn merge_values(&mut self, other: &HashMap<String, Value>) {
        for (k, v) in other {
            self.values.insert(k.clone(), v.clone());
        }
    }
}
