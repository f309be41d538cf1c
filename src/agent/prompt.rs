//! System prompt assembly.

use chrono::{DateTime, Utc};

use crate::config::{AgentMode, GateMode};
use crate::memory::service::NO_PRIOR_CONTEXT;
use crate::tools::{create_calendar_event, draft_and_send_email};

/// Context strings gathered before the first model call.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    /// Output of `build_context`; may be the no-context sentinel.
    pub memory: String,
    pub constraints: Option<String>,
    pub email: Option<String>,
    pub calendar: Option<String>,
}

impl Default for PromptContext {
    fn default() -> Self {
        Self {
            memory: NO_PRIOR_CONTEXT.to_string(),
            constraints: None,
            email: None,
            calendar: None,
        }
    }
}

const PERSONA: &str = "You are Cortex, the user's personal chief of staff. You help them stay on top \
of email, calendar, and commitments. Be concise and concrete, and use what you know about the user \
to tailor every answer.";

pub fn system_prompt(
    context: &PromptContext,
    now: DateTime<Utc>,
    mode: AgentMode,
    gate: GateMode,
) -> String {
    let mut out = String::from(PERSONA);

    out.push_str(&format!(
        "\n\nCurrent time: {} (UTC)",
        now.format("%A, %B %-d, %Y %H:%M")
    ));

    out.push_str("\n\n# What you know about the user\n");
    if context.memory == NO_PRIOR_CONTEXT {
        out.push_str("Nothing is stored about the user yet.");
    } else {
        out.push_str(&context.memory);
    }

    if let Some(constraints) = context.constraints.as_deref().filter(|c| *c != NO_PRIOR_CONTEXT) {
        out.push_str("\n\n# Standing preferences for anything written on the user's behalf\n");
        out.push_str(constraints);
    }
    if let Some(email) = &context.email {
        out.push_str("\n\n# Recent inbox\n");
        out.push_str(email);
    }
    if let Some(calendar) = &context.calendar {
        out.push_str("\n\n# Upcoming calendar\n");
        out.push_str(calendar);
    }

    out.push_str("\n\n# How to act\n");
    match mode {
        AgentMode::Tools => {
            out.push_str(
                "- Look things up with search_emails, get_calendar_events, and search_memory instead of guessing.\n\
                 - When the user asks you to remember something, or states a lasting preference, call save_memory.\n",
            );
            out.push_str(&format!(
                "- NEVER call {} or {} until you have shown the user the exact draft or proposal in an \
                 earlier message and they have explicitly approved it in their latest message. On a first \
                 request, write the draft or proposal out and ask for confirmation.",
                draft_and_send_email::NAME,
                create_calendar_event::NAME
            ));
            if gate == GateMode::Strict {
                out.push_str(
                    "\n- Approval is checked: a gated call without the user's explicit approval is refused.",
                );
            }
        }
        AgentMode::Context => {
            out.push_str(
                "- You cannot send email or create events yourself. When asked, write out the draft or \
                 proposal so the user can act on it.\n\
                 - Answer from the context above; say so plainly when it does not contain the answer.",
            );
        }
    }

    out
}
