//! `search_memory` tool: hybrid recall over the user's facts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::memory::service::MemoryService;

pub const NAME: &str = "search_memory";
pub const DESCRIPTION: &str = "Recall what you know about the user: facts relevant to the query \
plus their most important standing preferences and constraints.";

const MAX_RESULTS: usize = 20;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoryParams {
    #[schemars(description = "What to recall, in natural language")]
    pub query: String,

    #[schemars(description = "Maximum number of facts to return (1-20). Defaults to 5.")]
    pub limit: Option<usize>,
}

pub(super) async fn run(
    memory: &MemoryService,
    user_id: &str,
    params: SearchMemoryParams,
    default_limit: usize,
) -> Result<String, ToolError> {
    if params.query.trim().is_empty() {
        return Err(ToolError::validation(NAME, "query must not be empty"));
    }
    let limit = params.limit.unwrap_or(default_limit).clamp(1, MAX_RESULTS);

    let facts = memory.retrieve_relevant(user_id, &params.query, limit).await?;
    if facts.is_empty() {
        return Ok("No relevant memories found".into());
    }

    Ok(facts
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n"))
}
