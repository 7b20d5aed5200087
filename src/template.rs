//! Prompt template rendering utilities.
//!
//! Prompt templates use Handlebars syntax (e.g. `{{agentName}}`). Missing
//! keys render as empty strings and output is not HTML-escaped.

use anyhow::Result;
use handlebars::Handlebars;
use serde_json::Value;

use crate::types::state::State;

/// Render a Handlebars template string using the provided JSON data.
pub fn render_template(template: &str, data: &Value) -> Result<String> {
    let mut h = Handlebars::new();
    h.register_escape_fn(handlebars::no_escape);
    h.register_template_string("t", template)?;
    Ok(h.render("t", data)?)
}

/// Render a template against a composed state.
///
/// Templates see the state's `values`; `{{providers}}` falls back to the
/// state's text when no provider set it.
pub fn compose_prompt_from_state(state: &State, template: &str) -> Result<String> {
    let mut data: serde_json::Map<String, Value> = state
        .values
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    data.entry("providers")
        .or_insert_with(|| Value::String(state.text.clone()));
    render_template(template, &Value::Object(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_template_without_escaping() {
        let out = render_template("Hi {{name}} & {{missing}}!", &json!({"name": "<Ada>"})).unwrap();
        assert_eq!(out, "Hi <Ada> & !");
    }

    #[test]
    fn test_compose_prompt_uses_state_text_for_providers() {
        let mut state = State::with_text("# Facts\nSky is blue");
        state.set_value("agentName", "Eliza");

        let prompt =
            compose_prompt_from_state(&state, "{{agentName}} knows:\n{{providers}}").unwrap();
        assert_eq!(prompt, "Eliza knows:\n# Facts\nSky is blue");
    }

    #[test]
    fn test_invalid_template_is_an_error() {
        assert!(render_template("{{#if}}", &json!({})).is_err());
    }
}
