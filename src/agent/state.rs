use std::collections::HashSet;

use super::prompt::PromptContext;
use crate::llm::{ChatMessage, Role, ToolCall};

/// Observation recorded for a call whose execution was cut off.
pub const CANCELLED_OBSERVATION: &str =
    "Cancelled: the request ended before this action reported back. Its outcome is unknown.";

/// Working memory for one chat request.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub user_id: String,
    /// Loaded history followed by everything this request appended.
    pub turns: Vec<ChatMessage>,
    pub context: PromptContext,
    loaded: usize,
}

impl AgentState {
    /// Start from stored `history` and the new user `message`.
    ///
    /// A stored assistant turn whose calls never got observations (a crashed
    /// request) is sealed first so the history handed to the model is valid.
    pub fn new(
        user_id: impl Into<String>,
        history: Vec<ChatMessage>,
        message: impl Into<String>,
        context: PromptContext,
    ) -> Self {
        let loaded = history.len();
        let mut state = Self {
            user_id: user_id.into(),
            turns: history,
            context,
            loaded,
        };
        state.seal_pending_calls(CANCELLED_OBSERVATION);
        state.turns.push(ChatMessage::user(message));
        state
    }

    /// Turns produced by this request, in order. These are what gets persisted.
    pub fn new_turns(&self) -> &[ChatMessage] {
        &self.turns[self.loaded..]
    }

    /// Calls of the latest assistant turn that have no observation yet.
    pub fn pending_calls(&self) -> Vec<&ToolCall> {
        let Some(idx) = self.turns.iter().rposition(|t| t.role == Role::Assistant) else {
            return Vec::new();
        };
        let answered: HashSet<&str> = self.turns[idx + 1..]
            .iter()
            .filter(|t| t.role == Role::Tool)
            .filter_map(|t| t.tool_call_id.as_deref())
            .collect();
        self.turns[idx]
            .tool_calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .collect()
    }

    /// Give every pending call the observation `note`. Returns how many were sealed.
    pub fn seal_pending_calls(&mut self, note: &str) -> usize {
        let ids: Vec<String> = self.pending_calls().iter().map(|c| c.id.clone()).collect();
        for id in &ids {
            self.turns.push(ChatMessage::tool(id.clone(), note));
        }
        ids.len()
    }

    /// Latest non-empty assistant text produced by this request.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.new_turns()
            .iter()
            .rev()
            .filter(|t| t.role == Role::Assistant)
            .map(|t| t.content.trim())
            .find(|c| !c.is_empty())
    }
}
