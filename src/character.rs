//! Character parsing and validation.

use crate::error::RuntimeError;
use crate::types::agent::{Character, KnowledgeItem};
use anyhow::{Context, Result};
use std::collections::HashSet;

/// Parse a character from a JSON string
pub fn parse_character(json: &str) -> Result<Character> {
    let character: Character =
        serde_json::from_str(json).context("Failed to parse character JSON")?;
    validate_character(&character).context("Character validation failed")?;
    Ok(character)
}

/// Load and parse a character file
pub async fn load_character_file(path: &str) -> Result<Character> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read character file {path}"))?;
    parse_character(&json)
}

/// Validate a character configuration
pub fn validate_character(character: &Character) -> Result<()> {
    let invalid = |msg: &str| -> anyhow::Error { RuntimeError::Configuration(msg.to_string()).into() };

    if character.name.trim().is_empty() {
        return Err(invalid("Character name is required"));
    }
    if character.plugins.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid("Empty plugin name in plugins list"));
    }
    if character.templates.keys().any(|k| k.is_empty()) {
        return Err(invalid("Template names must not be empty"));
    }
    for item in &character.knowledge {
        match item {
            KnowledgeItem::Text(text) if text.trim().is_empty() => {
                return Err(invalid("Knowledge entries must not be empty"));
            }
            KnowledgeItem::File { path, .. } if path.trim().is_empty() => {
                return Err(invalid("Knowledge file entries need a path"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Merge character with default values
pub fn merge_character_defaults(mut character: Character) -> Character {
    if character.name.trim().is_empty() {
        character.name = "Unnamed Character".to_string();
    }
    if character.username.is_none() {
        character.username = Some(character.name.clone());
    }

    let mut seen = HashSet::new();
    character.plugins.retain(|p| seen.insert(p.clone()));

    character
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::agent::Bio;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_character_basic() {
        let json = r#"{
            "name": "TestAgent",
            "bio": "A test agent for testing purposes",
            "plugins": ["@elizaos/plugin-sql"]
        }"#;

        let character = parse_character(json).unwrap();
        assert_eq!(character.name, "TestAgent");
        assert_eq!(character.plugins, vec!["@elizaos/plugin-sql".to_string()]);
    }

    #[test]
    fn test_parse_character_with_array_bio() {
        let json = r#"{
            "name": "TestAgent",
            "bio": ["Line 1", "Line 2"]
        }"#;

        let character = parse_character(json).unwrap();
        match &character.bio {
            Bio::Multiple(v) => assert_eq!(v.len(), 2),
            _ => panic!("Expected multiple bio"),
        }
    }

    #[test]
    fn test_parse_character_rejects_bad_json() {
        assert!(parse_character("{\"bio\": 3").is_err());
    }

    #[test]
    fn test_validate_character_empty_name() {
        let character = Character::new("  ");
        let err = validate_character(&character).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_character_empty_knowledge() {
        let mut character = Character::new("TestAgent");
        character.knowledge.push(KnowledgeItem::Text(String::new()));
        assert!(validate_character(&character).is_err());
    }

    #[test]
    fn test_merge_character_defaults() {
        let mut character = Character::new("");
        character.plugins = vec!["a".into(), "b".into(), "a".into()];

        let merged = merge_character_defaults(character);
        assert_eq!(merged.name, "Unnamed Character");
        assert_eq!(merged.username.as_deref(), Some("Unnamed Character"));
        assert_eq!(merged.plugins, vec!["a".to_string(), "b".to_string()]);
    }
}
