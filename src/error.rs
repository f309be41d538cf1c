//! Error taxonomy for the memory, tool, and agent layers.
//!
//! Advisory failures (context fetches, fact extraction) are logged and degrade
//! to empty results at their call sites. [`MemoryError::Persistence`] is never
//! swallowed. Every [`ToolError`] becomes an observation string for the model.

use thiserror::Error;

/// Failures from the fact store and memory service.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The fact or query was rejected before any write happened.
    #[error("invalid memory request: {0}")]
    Validation(String),

    /// The embedding provider failed or returned an unusable vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The durable write or read could not complete.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Persistence(format!("storage task failed: {e}"))
    }
}

/// Failures while executing one tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Missing or malformed argument; the model can retry with corrected input.
    #[error("invalid arguments for {tool}: {reason}")]
    Validation { tool: &'static str, reason: String },

    /// A mail or calendar call failed.
    #[error("{tool} failed: {message}")]
    Collaborator { tool: &'static str, message: String },

    /// A gated action was requested without a prior user approval turn.
    #[error("{tool} requires explicit user approval. Present the proposed action to the user and wait for them to confirm before calling it.")]
    ApprovalRequired { tool: &'static str },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl ToolError {
    pub fn validation(tool: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            tool,
            reason: reason.into(),
        }
    }

    pub fn collaborator(tool: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            tool,
            message: format!("{err:#}"),
        }
    }
}

/// Failures that end a chat request.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Empty message, missing ids, or a conversation owned by someone else.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("language model call failed: {0}")]
    Model(String),

    #[error("conversation storage failed: {0}")]
    Persistence(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),
}

impl From<MemoryError> for AgentError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::Validation(msg) => Self::InvalidRequest(msg),
            other => Self::Persistence(other.to_string()),
        }
    }
}
