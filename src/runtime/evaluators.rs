//! Evaluator pipeline.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error};

use super::AgentRuntime;
use crate::types::components::{EvaluatorHandler, ResponseEmitter};
use crate::types::events::{EvaluatorEventPayload, EventPayload, EventType};
use crate::types::memory::Memory;
use crate::types::state::State;

impl AgentRuntime {
    /// Run post-response evaluators and return the ones that ran.
    ///
    /// `always_run` evaluators are always selected. The others are selected
    /// only when the agent replied (`did_respond`) and their `validate`
    /// accepts the message. Selected evaluators run sequentially; an error is
    /// logged and does not stop the rest.
    pub async fn evaluate(
        &self,
        message: &Memory,
        state: &State,
        did_respond: bool,
        callback: Option<&ResponseEmitter>,
        responses: &[Memory],
    ) -> Result<Vec<Arc<dyn EvaluatorHandler>>> {
        let evaluators = self.evaluators.read().await.all();

        let mut selected = Vec::new();
        for evaluator in evaluators {
            let run = if evaluator.definition().always_run {
                true
            } else {
                did_respond && evaluator.validate(self, message, state).await
            };
            if run {
                selected.push(evaluator);
            }
        }
        debug!(
            message_id = ?message.id,
            did_respond,
            count = selected.len(),
            "Running evaluators"
        );

        for evaluator in &selected {
            let name = evaluator.definition().name;
            let payload = |completed: Option<bool>, err: Option<String>| {
                EventPayload::from_typed(
                    "runtime",
                    &EvaluatorEventPayload {
                        evaluator_name: name.clone(),
                        room_id: message.room_id.clone(),
                        message_id: message.id.clone(),
                        completed,
                        error: err,
                    },
                )
            };
            self.emit_event(EventType::EvaluatorStarted, payload(None, None))
                .await;

            let err = match evaluator
                .handle(self, message, state, callback, responses)
                .await
            {
                Ok(_) => None,
                Err(e) => {
                    let text = format!("{e:#}");
                    error!(evaluator = %name, message_id = ?message.id, error = %text, "Evaluator failed");
                    Some(text)
                }
            };

            self.emit_event(
                EventType::EvaluatorCompleted,
                payload(Some(err.is_none()), err),
            )
            .await;
        }

        Ok(selected)
    }
}
