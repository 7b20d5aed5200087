//! Character configuration: the static personality an agent runtime is built from.

use super::primitives::{Content, UUID};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Example message for demonstration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExample {
    /// Associated user name
    pub name: String,
    pub content: Content,
}

/// A knowledge entry: inline text, or a file to read at startup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KnowledgeItem {
    Text(String),
    File {
        path: String,
        /// Whether the knowledge is shared across agents
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        shared: bool,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,
}

/// Biography can be a single string or multiple strings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bio {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for Bio {
    fn default() -> Self {
        Bio::Single(String::new())
    }
}

/// Configuration for an agent's character. Immutable once a runtime owns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Named prompt templates (Handlebars)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub templates: HashMap<String, String>,
    #[serde(default)]
    pub bio: Bio,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_examples: Vec<Vec<MessageExample>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge: Vec<KnowledgeItem>,
    /// Plugin names to load from the runtime's catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    /// Settings; a nested `secrets` object is consulted for secrets too
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub settings: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub secrets: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleConfig>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Character {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Get the bio as a single string
    pub fn bio_string(&self) -> String {
        match &self.bio {
            Bio::Single(s) => s.clone(),
            Bio::Multiple(v) => v.join("\n"),
        }
    }

    /// Look up `settings.secrets.<key>`
    pub fn nested_secret(&self, key: &str) -> Option<&Value> {
        self.settings
            .get("secrets")
            .and_then(Value::as_object)
            .and_then(|secrets| secrets.get(key))
    }
}

impl Default for Character {
    fn default() -> Self {
        Character {
            id: None,
            name: "Unnamed Character".to_string(),
            username: None,
            system: None,
            templates: HashMap::new(),
            bio: Bio::default(),
            message_examples: Vec::new(),
            post_examples: Vec::new(),
            topics: Vec::new(),
            adjectives: Vec::new(),
            knowledge: Vec::new(),
            plugins: Vec::new(),
            settings: HashMap::new(),
            secrets: HashMap::new(),
            style: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_character_from_json() {
        let json = r#"{
            "name": "TestAgent",
            "bio": "A test agent for testing purposes"
        }"#;

        let character = Character::from_json(json).unwrap();
        assert_eq!(character.name, "TestAgent");
        assert_eq!(character.bio_string(), "A test agent for testing purposes");
        assert!(character.plugins.is_empty());
    }

    #[test]
    fn test_character_with_array_bio() {
        let json = r#"{
            "name": "TestAgent",
            "bio": ["Line 1", "Line 2", "Line 3"]
        }"#;

        let character = Character::from_json(json).unwrap();
        assert_eq!(character.bio_string(), "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn test_knowledge_items_text_and_file() {
        let json = r#"{
            "name": "TestAgent",
            "bio": "",
            "knowledge": ["The sky is blue.", {"path": "docs/faq.md", "shared": true}]
        }"#;

        let character = Character::from_json(json).unwrap();
        assert_eq!(
            character.knowledge,
            vec![
                KnowledgeItem::Text("The sky is blue.".to_string()),
                KnowledgeItem::File {
                    path: "docs/faq.md".to_string(),
                    shared: true
                },
            ]
        );
    }

    #[test]
    fn test_nested_secret_lookup() {
        let json = r#"{
            "name": "TestAgent",
            "bio": "",
            "settings": {"secrets": {"API_KEY": "abc"}, "model": "small"}
        }"#;

        let character = Character::from_json(json).unwrap();
        assert_eq!(character.nested_secret("API_KEY"), Some(&Value::from("abc")));
        assert_eq!(character.nested_secret("model"), None);
    }
}
