//! The Model/Tools state machine.

use std::collections::HashSet;

use super::state::AgentState;
use crate::error::AgentError;
use crate::llm::{LanguageModel, ToolCall, ToolDefinition};
use crate::tools::ToolExecutor;

pub const FALLBACK_REPLY: &str =
    "I wasn't able to finish this request within the allowed number of steps.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Model,
    Tools,
}

/// Alternate model and tool steps until the model answers without tool
/// calls or `max_iterations` model calls have been made.
///
/// A return to [`Step::Model`] happens only after every call of the
/// preceding assistant turn has an observation in `state.turns`.
pub async fn run(
    model: &dyn LanguageModel,
    executor: &ToolExecutor,
    system_prompt: &str,
    tools: &[ToolDefinition],
    state: &mut AgentState,
    max_iterations: usize,
) -> Result<String, AgentError> {
    let mut step = Step::Model;
    let mut iteration = 0usize;

    loop {
        match step {
            Step::Model => {
                if iteration >= max_iterations {
                    tracing::warn!(user = %state.user_id, max_iterations, "iteration cap reached");
                    return Ok(state
                        .last_assistant_text()
                        .map(str::to_string)
                        .unwrap_or_else(|| FALLBACK_REPLY.to_string()));
                }
                iteration += 1;

                let mut turn = model
                    .generate(system_prompt, &state.turns, tools)
                    .await
                    .map_err(|e| AgentError::Model(format!("{e:#}")))?;

                if tools.is_empty() && !turn.tool_calls.is_empty() {
                    tracing::warn!(
                        user = %state.user_id,
                        calls = turn.tool_calls.len(),
                        "model requested tools while none were offered; ignoring"
                    );
                    turn.tool_calls.clear();
                }
                ensure_distinct_ids(&mut turn.tool_calls, iteration);

                let calls = turn.tool_calls.len();
                tracing::debug!(user = %state.user_id, iteration, calls, "model step");

                if calls == 0 {
                    let reply = if turn.content.trim().is_empty() {
                        state
                            .last_assistant_text()
                            .map(str::to_string)
                            .unwrap_or_else(|| FALLBACK_REPLY.to_string())
                    } else {
                        turn.content.clone()
                    };
                    state.turns.push(turn.into_message());
                    return Ok(reply);
                }

                state.turns.push(turn.into_message());
                step = Step::Tools;
            }
            Step::Tools => {
                let calls = state
                    .turns
                    .last()
                    .map(|t| t.tool_calls.clone())
                    .unwrap_or_default();

                let observations = executor
                    .execute_batch(&state.user_id, &calls, &state.turns)
                    .await;
                tracing::debug!(user = %state.user_id, iteration, observations = observations.len(), "tool step");

                state.turns.extend(observations);
                step = Step::Model;
            }
        }
    }
}

/// Give empty or repeated call ids a unique replacement so every
/// observation maps back to exactly one call.
fn ensure_distinct_ids(calls: &mut [ToolCall], iteration: usize) {
    let mut seen = HashSet::new();
    for (index, call) in calls.iter_mut().enumerate() {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            call.id = format!("call_{iteration}_{index}");
            seen.insert(call.id.clone());
        }
    }
}
