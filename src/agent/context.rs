//! Keyword intent routing and concurrent context pre-fetch.
//!
//! Intents come from a fixed phrase table, not a model call. Every fetch is
//! advisory: a failure becomes a note in the prompt (or the no-context
//! sentinel for memory) and never fails the request.

use std::sync::Arc;

use super::prompt::PromptContext;
use crate::config::{AgentConfig, AgentMode};
use crate::integrations::{format_email_list, format_event_list, CalendarClient, MailClient};
use crate::memory::service::{MemoryService, NO_PRIOR_CONTEXT};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Intents {
    pub needs_email: bool,
    pub needs_calendar: bool,
    pub needs_memory_update: bool,
    pub needs_email_send: bool,
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    Email,
    Calendar,
    MemoryUpdate,
    EmailSend,
}

const INTENT_RULES: &[(Intent, &[&str])] = &[
    (
        Intent::Email,
        &[
            "inbox", "unread", "latest email", "new email", "new emails", "emails", "any mail",
            "my mail", "email from", "messages from", "replied",
        ],
    ),
    (
        Intent::Calendar,
        &[
            "meeting", "meetings", "schedule", "calendar", "agenda", "appointment", "event",
            "events", "free time", "am i free", "busy",
        ],
    ),
    (
        Intent::MemoryUpdate,
        &[
            "i prefer", "i like", "i love", "i hate", "i dislike", "i don't like", "remember",
            "always", "never", "i usually", "my favorite", "call me", "i'm working on",
        ],
    ),
    (
        Intent::EmailSend,
        &[
            "send an email", "send email", "send a message", "email to", "reply to", "write to",
            "draft", "respond to", "follow up with",
        ],
    ),
];

/// Classify `message` into independent intent flags.
pub fn classify(message: &str) -> Intents {
    let normalized: String = message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", normalized.split_whitespace().collect::<Vec<_>>().join(" "));

    let mut intents = Intents::default();
    for (intent, phrases) in INTENT_RULES {
        if phrases.iter().any(|p| padded.contains(&format!(" {p} "))) {
            match intent {
                Intent::Email => intents.needs_email = true,
                Intent::Calendar => intents.needs_calendar = true,
                Intent::MemoryUpdate => intents.needs_memory_update = true,
                Intent::EmailSend => intents.needs_email_send = true,
            }
        }
    }
    intents
}

#[derive(Clone)]
pub struct ContextAssembler {
    memory: Arc<MemoryService>,
    mail: Arc<dyn MailClient>,
    calendar: Arc<dyn CalendarClient>,
    config: AgentConfig,
}

impl ContextAssembler {
    pub fn new(
        memory: Arc<MemoryService>,
        mail: Arc<dyn MailClient>,
        calendar: Arc<dyn CalendarClient>,
        config: AgentConfig,
    ) -> Self {
        Self {
            memory,
            mail,
            calendar,
            config,
        }
    }

    /// Classify `message` and gather the context it calls for, concurrently.
    ///
    /// Memory context is always fetched. Inbox and calendar are pre-fetched
    /// only in [`AgentMode::Context`]; in tools mode the model fetches them.
    pub async fn assemble(&self, user_id: &str, message: &str) -> (Intents, PromptContext) {
        let intents = classify(message);
        let prefetch = self.config.mode == AgentMode::Context;

        tracing::debug!(user = %user_id, ?intents, prefetch, "intents classified");

        let (memory, constraints, email, calendar) = tokio::join!(
            self.memory_context(user_id),
            async {
                if intents.needs_email_send {
                    self.constraint_context(user_id).await
                } else {
                    None
                }
            },
            async {
                if prefetch && intents.needs_email {
                    Some(self.email_context(user_id).await)
                } else {
                    None
                }
            },
            async {
                if prefetch && intents.needs_calendar {
                    Some(self.calendar_context(user_id).await)
                } else {
                    None
                }
            },
        );

        (
            intents,
            PromptContext {
                memory,
                constraints,
                email,
                calendar,
            },
        )
    }

    async fn memory_context(&self, user_id: &str) -> String {
        let min_importance = self.memory.config().context_min_importance;
        match self.memory.build_context(user_id, min_importance).await {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "memory context unavailable");
                NO_PRIOR_CONTEXT.to_string()
            }
        }
    }

    async fn constraint_context(&self, user_id: &str) -> Option<String> {
        match self.memory.build_constraint_context(user_id).await {
            Ok(block) if block != NO_PRIOR_CONTEXT => Some(block),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "constraint context unavailable");
                None
            }
        }
    }

    async fn email_context(&self, user_id: &str) -> String {
        match self
            .mail
            .search(user_id, "in:inbox", self.config.email_context_results)
            .await
        {
            Ok(emails) if emails.is_empty() => "No emails found".into(),
            Ok(emails) => format_email_list(&emails),
            Err(e) => {
                tracing::warn!(user = %user_id, error = %format!("{e:#}"), "inbox fetch failed");
                format!("Inbox is unavailable right now ({e}).")
            }
        }
    }

    async fn calendar_context(&self, user_id: &str) -> String {
        match self
            .calendar
            .list_events(user_id, self.config.calendar_context_days)
            .await
        {
            Ok(events) if events.is_empty() => "No upcoming events found".into(),
            Ok(events) => format_event_list(&events),
            Err(e) => {
                tracing::warn!(user = %user_id, error = %format!("{e:#}"), "calendar fetch failed");
                format!("Calendar is unavailable right now ({e}).")
            }
        }
    }
}
