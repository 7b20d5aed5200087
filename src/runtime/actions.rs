//! Action pipeline.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::AgentRuntime;
use crate::types::components::{
    ActionContext, ActionParameters, ActionResult, HandlerOptions, ResponseEmitter,
};
use crate::types::database::Log;
use crate::types::events::{ActionEventPayload, EventPayload, EventType};
use crate::types::memory::Memory;
use crate::types::primitives::Content;
use crate::types::state::State;

/// Content key carrying per-action parameters, keyed by upper-case action name
const PARAMS_KEY: &str = "params";

fn action_parameters(content: &Content, action: &str) -> Option<ActionParameters> {
    let params = content.extra.get(PARAMS_KEY)?.get(action.trim().to_uppercase())?;
    match params {
        Value::Object(map) => Some(map.clone().into_iter().collect()),
        _ => None,
    }
}

impl AgentRuntime {
    /// Run the actions named by each response, in order.
    ///
    /// Names resolve by exact name, normalized name, then simile; unknown
    /// names are skipped with a warning. Actions whose `validate` returns
    /// false are skipped silently. Actions run one after another and each
    /// sees the results of the ones before it. A failing handler is logged
    /// and recorded as a failed result; the remaining actions still run.
    pub async fn process_actions(
        &self,
        message: &Memory,
        responses: &[Memory],
        state: Option<&State>,
        callback: Option<&ResponseEmitter>,
    ) -> Result<Vec<ActionResult>> {
        let empty = State::new();
        let state = state.unwrap_or(&empty);
        let mut results: Vec<ActionResult> = Vec::new();

        for response in responses {
            let Some(names) = response.content.actions.as_deref() else {
                continue;
            };

            for name in names {
                let Some(action) = self.get_action(name).await else {
                    warn!(action = %name, message_id = ?message.id, "Action not found, skipping");
                    continue;
                };
                let action_name = action.definition().name;

                if !action.validate(self, message, state).await {
                    debug!(action = %action_name, "Action validation failed, skipping");
                    continue;
                }

                let event = |err: Option<String>| {
                    EventPayload::from_typed(
                        "runtime",
                        &ActionEventPayload {
                            action_name: action_name.clone(),
                            room_id: message.room_id.clone(),
                            message_id: message.id.clone(),
                            content: response.content.clone(),
                            error: err,
                        },
                    )
                };
                self.emit_event(EventType::ActionStarted, event(None)).await;

                let options = HandlerOptions {
                    action_context: Some(ActionContext {
                        previous_results: results.clone(),
                    }),
                    parameters: action_parameters(&response.content, name),
                };

                debug!(action = %action_name, "Executing action");
                let outcome = action
                    .handle(self, message, state, &options, callback)
                    .await;

                let (result, err) = match outcome {
                    Ok(result) => (result, None),
                    Err(e) => {
                        error!(
                            action = %action_name,
                            message_id = ?message.id,
                            error = %format!("{e:#}"),
                            "Action failed"
                        );
                        let text = format!("{e:#}");
                        (Some(ActionResult::failure(text.clone())), Some(text))
                    }
                };

                self.log_action(message, &action_name, result.as_ref(), err.as_deref())
                    .await;
                self.emit_event(EventType::ActionCompleted, event(err)).await;

                if let Some(result) = result {
                    results.push(result);
                }
            }
        }

        Ok(results)
    }

    /// Best-effort action log through the adapter.
    async fn log_action(
        &self,
        message: &Memory,
        action: &str,
        result: Option<&ActionResult>,
        error: Option<&str>,
    ) {
        let Some(adapter) = self.get_adapter() else {
            return;
        };
        let log = Log {
            id: None,
            entity_id: self.agent_id.clone(),
            room_id: Some(message.room_id.clone()),
            body: json!({
                "action": action,
                "messageId": message.id,
                "runId": self.get_current_run_id(),
                "success": error.is_none() && result.map_or(true, |r| r.success),
                "result": result,
                "error": error,
            }),
            log_type: "action".to_string(),
            created_at: Some(chrono::Utc::now().timestamp_millis()),
        };
        if let Err(e) = adapter.log(&log).await {
            warn!(action, error = %format!("{e:#}"), "Failed to write action log");
        }
    }
}
