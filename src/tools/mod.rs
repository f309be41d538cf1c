//! The fixed tool registry the agent loop dispatches to.
//!
//! [`ToolExecutor::execute`] never fails: every [`ToolError`] is rendered into
//! an observation string so the model can react on its next turn.

pub mod create_calendar_event;
pub mod draft_and_send_email;
pub mod gate;
pub mod get_calendar_events;
pub mod save_memory;
pub mod search_emails;
pub mod search_memory;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::config::GateMode;
use crate::error::ToolError;
use crate::integrations::{CalendarClient, MailClient};
use crate::llm::{ChatMessage, ToolCall, ToolDefinition};
use crate::memory::service::MemoryService;

/// Tools that cause side effects outside the store.
pub const GATED_TOOLS: [&str; 2] = [draft_and_send_email::NAME, create_calendar_event::NAME];

/// Leading text of every failed call's observation.
pub const ERROR_PREFIX: &str = "Error: ";

#[derive(Clone)]
pub struct ToolExecutor {
    memory: Arc<MemoryService>,
    mail: Arc<dyn MailClient>,
    calendar: Arc<dyn CalendarClient>,
    gate: GateMode,
}

impl ToolExecutor {
    pub fn new(
        memory: Arc<MemoryService>,
        mail: Arc<dyn MailClient>,
        calendar: Arc<dyn CalendarClient>,
        gate: GateMode,
    ) -> Self {
        Self {
            memory,
            mail,
            calendar,
            gate,
        }
    }

    /// Definitions offered to the model, parameters as JSON Schema.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            definition::<search_emails::SearchEmailsParams>(
                search_emails::NAME,
                search_emails::DESCRIPTION,
            ),
            definition::<get_calendar_events::GetCalendarEventsParams>(
                get_calendar_events::NAME,
                get_calendar_events::DESCRIPTION,
            ),
            definition::<search_memory::SearchMemoryParams>(
                search_memory::NAME,
                search_memory::DESCRIPTION,
            ),
            definition::<save_memory::SaveMemoryParams>(save_memory::NAME, save_memory::DESCRIPTION),
            definition::<draft_and_send_email::DraftAndSendEmailParams>(
                draft_and_send_email::NAME,
                draft_and_send_email::DESCRIPTION,
            ),
            definition::<create_calendar_event::CreateCalendarEventParams>(
                create_calendar_event::NAME,
                create_calendar_event::DESCRIPTION,
            ),
        ]
    }

    /// Run one call and return its observation.
    ///
    /// `history` is the conversation so far; the strict gate reads it to find
    /// the user's approval.
    pub async fn execute(&self, user_id: &str, call: &ToolCall, history: &[ChatMessage]) -> String {
        tracing::info!(user = %user_id, tool = %call.name, call_id = %call.id, "tool call");

        match self.dispatch(user_id, call, history).await {
            Ok(observation) => {
                tracing::debug!(tool = %call.name, call_id = %call.id, len = observation.len(), "tool succeeded");
                observation
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool failed");
                format!("{ERROR_PREFIX}{e}")
            }
        }
    }

    /// Run every call of one assistant turn concurrently.
    ///
    /// Returns exactly one tool-role turn per call, in call order. A failing
    /// call only affects its own observation.
    pub async fn execute_batch(
        &self,
        user_id: &str,
        calls: &[ToolCall],
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        futures::future::join_all(calls.iter().map(|call| async move {
            ChatMessage::tool(call.id.clone(), self.execute(user_id, call, history).await)
        }))
        .await
    }

    async fn dispatch(
        &self,
        user_id: &str,
        call: &ToolCall,
        history: &[ChatMessage],
    ) -> Result<String, ToolError> {
        match call.name.as_str() {
            search_emails::NAME => {
                let params = parse_args(search_emails::NAME, &call.arguments)?;
                search_emails::run(self.mail.as_ref(), user_id, params).await
            }
            get_calendar_events::NAME => {
                let params = parse_args(get_calendar_events::NAME, &call.arguments)?;
                get_calendar_events::run(self.calendar.as_ref(), user_id, params).await
            }
            search_memory::NAME => {
                let params = parse_args(search_memory::NAME, &call.arguments)?;
                let limit = self.memory.config().retrieval_limit;
                search_memory::run(&self.memory, user_id, params, limit).await
            }
            save_memory::NAME => {
                let params = parse_args(save_memory::NAME, &call.arguments)?;
                save_memory::run(self.memory.store(), user_id, params).await
            }
            draft_and_send_email::NAME => {
                let params = parse_args(draft_and_send_email::NAME, &call.arguments)?;
                self.check_gate(draft_and_send_email::NAME, call, history)?;
                draft_and_send_email::run(self.mail.as_ref(), user_id, params).await
            }
            create_calendar_event::NAME => {
                let params = parse_args(create_calendar_event::NAME, &call.arguments)?;
                self.check_gate(create_calendar_event::NAME, call, history)?;
                create_calendar_event::run(self.calendar.as_ref(), user_id, params).await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    fn check_gate(
        &self,
        tool: &'static str,
        call: &ToolCall,
        history: &[ChatMessage],
    ) -> Result<(), ToolError> {
        if self.gate == GateMode::Strict && !gate::approved_in(history, &call.id) {
            return Err(ToolError::ApprovalRequired { tool });
        }
        Ok(())
    }
}

fn definition<P: JsonSchema>(name: &'static str, description: &'static str) -> ToolDefinition {
    let mut parameters = schemars::schema_for!(P).to_value();
    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    ToolDefinition {
        name,
        description,
        parameters,
    }
}

fn parse_args<P: DeserializeOwned>(tool: &'static str, arguments: &Value) -> Result<P, ToolError> {
    if let Value::String(raw) = arguments {
        return Err(ToolError::validation(
            tool,
            format!("arguments must be a JSON object, got unparseable text: {raw}"),
        ));
    }
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::validation(tool, e.to_string()))
}
