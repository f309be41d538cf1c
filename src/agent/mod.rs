//! Chat orchestration.
//!
//! [`Agent::chat`] runs one request end to end: load the conversation window,
//! gather context, run the Model/Tools loop, persist the turns it produced,
//! and, when the user stated something worth keeping, spawn fact extraction
//! in the background so the reply is never held up by it.

pub mod context;
pub mod prompt;
pub mod runner;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{AgentConfig, AgentMode};
use crate::conversation::ConversationStore;
use crate::error::{AgentError, MemoryError};
use crate::integrations::{CalendarClient, MailClient};
use crate::llm::LanguageModel;
use crate::memory::service::MemoryService;
use crate::memory::types::MemoryFact;
use crate::tools::ToolExecutor;

use context::{ContextAssembler, Intents};
use state::{AgentState, CANCELLED_OBSERVATION};

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
}

pub type ExtractionHandle = JoinHandle<Result<Vec<MemoryFact>, MemoryError>>;

#[derive(Debug)]
pub struct ChatOutcome {
    pub reply: String,
    pub intents: Intents,
    /// Background fact extraction, if this message triggered one.
    pub extraction: Option<ExtractionHandle>,
}

pub struct Agent {
    model: Arc<dyn LanguageModel>,
    memory: Arc<MemoryService>,
    tools: ToolExecutor,
    assembler: ContextAssembler,
    conversations: ConversationStore,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        memory: Arc<MemoryService>,
        mail: Arc<dyn MailClient>,
        calendar: Arc<dyn CalendarClient>,
        conversations: ConversationStore,
        config: AgentConfig,
    ) -> Self {
        let tools = ToolExecutor::new(
            Arc::clone(&memory),
            Arc::clone(&mail),
            Arc::clone(&calendar),
            config.confirmation_gate,
        );
        let assembler = ContextAssembler::new(Arc::clone(&memory), mail, calendar, config.clone());
        Self {
            model,
            memory,
            tools,
            assembler,
            conversations,
            config,
        }
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, AgentError> {
        let ChatRequest {
            user_id,
            conversation_id,
            message,
        } = request;
        if user_id.trim().is_empty() {
            return Err(AgentError::InvalidRequest("user id must not be empty".into()));
        }
        if message.trim().is_empty() {
            return Err(AgentError::InvalidRequest("message must not be empty".into()));
        }

        let history = self
            .conversations
            .load(&user_id, &conversation_id, self.config.history_window)
            .await?;
        let (intents, context) = self.assembler.assemble(&user_id, &message).await;

        let system_prompt = prompt::system_prompt(
            &context,
            chrono::Utc::now(),
            self.config.mode,
            self.config.confirmation_gate,
        );
        let tool_defs = match self.config.mode {
            AgentMode::Tools => ToolExecutor::definitions(),
            AgentMode::Context => Vec::new(),
        };

        tracing::info!(
            user = %user_id,
            conversation = %conversation_id,
            history = history.len(),
            mode = ?self.config.mode,
            "chat request"
        );

        let mut state = AgentState::new(user_id.as_str(), history, message.as_str(), context);

        let run = runner::run(
            self.model.as_ref(),
            &self.tools,
            &system_prompt,
            &tool_defs,
            &mut state,
            self.config.max_iterations,
        );
        let result = match self.config.request_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(secs)),
            },
            None => run.await,
        };

        if matches!(result, Err(AgentError::Timeout(_))) {
            let sealed = state.seal_pending_calls(CANCELLED_OBSERVATION);
            tracing::warn!(user = %user_id, conversation = %conversation_id, sealed, "request timed out");
        }

        let persisted = self
            .conversations
            .append(&user_id, &conversation_id, state.new_turns().to_vec())
            .await;

        let reply = match (result, persisted) {
            (Ok(reply), Ok(())) => reply,
            (Ok(_), Err(e)) => return Err(e.into()),
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(persist_err)) => {
                tracing::error!(user = %user_id, error = %persist_err, "failed to persist turns of a failed request");
                return Err(e);
            }
        };

        let extraction = (intents.needs_memory_update || self.memory.config().extract_every_turn)
            .then(|| self.spawn_extraction(user_id.clone(), message));

        tracing::info!(
            user = %user_id,
            conversation = %conversation_id,
            turns = state.new_turns().len(),
            extracting = extraction.is_some(),
            "chat complete"
        );

        Ok(ChatOutcome {
            reply,
            intents,
            extraction,
        })
    }

    fn spawn_extraction(&self, user_id: String, message: String) -> ExtractionHandle {
        let memory = Arc::clone(&self.memory);
        tokio::spawn(async move {
            let result = memory.extract_facts(&user_id, &message, "chat").await;
            if let Err(e) = &result {
                tracing::error!(user = %user_id, error = %e, "background fact extraction failed");
            }
            result
        })
    }
}
