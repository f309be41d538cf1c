//! `save_memory` tool: explicit "remember this" writes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::memory::fact_store::FactStore;
use crate::memory::types::Category;

pub const NAME: &str = "save_memory";
pub const DESCRIPTION: &str = "Save a durable fact about the user when they ask you to remember \
something or state a lasting preference, habit, or constraint.";

const DEFAULT_IMPORTANCE: f64 = 0.7;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SaveMemoryParams {
    #[schemars(description = "Short standalone statement about the user")]
    pub fact: String,

    #[schemars(
        description = "One of: preference, habit, project, relationship, constraint, event, personal, other"
    )]
    pub category: String,

    #[schemars(description = "Importance from 0.0 to 1.0. Defaults to 0.7.")]
    pub importance: Option<f64>,
}

pub(super) async fn run(
    store: &FactStore,
    user_id: &str,
    params: SaveMemoryParams,
) -> Result<String, ToolError> {
    let category: Category = params
        .category
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|e: String| ToolError::validation(NAME, e))?;

    let mut metadata = Map::new();
    metadata.insert("source".into(), Value::String("tool".into()));

    let outcome = store
        .store(
            user_id,
            &params.fact,
            category,
            params.importance.unwrap_or(DEFAULT_IMPORTANCE),
            metadata,
        )
        .await?;

    if outcome.deduplicated {
        Ok(format!(
            "Already remembered: \"{}\" ({})",
            outcome.fact.fact, outcome.fact.category
        ))
    } else {
        Ok(format!(
            "Saved to memory: \"{}\" ({})",
            outcome.fact.fact, outcome.fact.category
        ))
    }
}
