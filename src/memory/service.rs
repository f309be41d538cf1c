//! Memory service: model-driven fact extraction and the two read paths the
//! agent needs (a per-turn context block and query-relevant retrieval).

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::extract::{self, EXTRACTION_PROMPT};
use super::fact_store::FactStore;
use super::types::{Category, MemoryFact};
use crate::config::MemoryConfig;
use crate::error::MemoryError;
use crate::llm::{ChatMessage, LanguageModel};

/// Returned by [`MemoryService::build_context`] when the user has no facts.
/// Callers treat it as "no memory", never as a fact.
pub const NO_PRIOR_CONTEXT: &str = "No prior context available.";

pub const CONTEXT_HEADER: &str = "User Profile & Context";

#[derive(Clone)]
pub struct MemoryService {
    store: Arc<FactStore>,
    model: Arc<dyn LanguageModel>,
    config: MemoryConfig,
}

impl MemoryService {
    pub fn new(store: Arc<FactStore>, model: Arc<dyn LanguageModel>, config: MemoryConfig) -> Self {
        Self {
            store,
            model,
            config,
        }
    }

    pub fn store(&self) -> &Arc<FactStore> {
        &self.store
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Ask the model for facts stated in `text` and store each one.
    ///
    /// Best effort: a model failure or unparseable output yields an empty
    /// result. Only a persistence failure is returned as an error.
    pub async fn extract_facts(
        &self,
        user_id: &str,
        text: &str,
        source: &str,
    ) -> Result<Vec<MemoryFact>, MemoryError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = match self
            .model
            .generate(EXTRACTION_PROMPT, &[ChatMessage::user(text)], &[])
            .await
        {
            Ok(turn) => turn.content,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %format!("{e:#}"), "fact extraction call failed");
                return Ok(Vec::new());
            }
        };

        let Some(candidates) = extract::parse_candidates(&response) else {
            tracing::debug!(user = %user_id, "extraction output had no JSON array");
            return Ok(Vec::new());
        };

        let mut stored: Vec<MemoryFact> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut metadata = candidate.metadata;
            metadata
                .entry("source")
                .or_insert_with(|| Value::String(source.to_string()));

            match self
                .store
                .store(
                    user_id,
                    &candidate.fact,
                    candidate.category,
                    candidate.importance,
                    metadata,
                )
                .await
            {
                Ok(outcome) => {
                    if !stored.iter().any(|f| f.id == outcome.fact.id) {
                        stored.push(outcome.fact);
                    }
                }
                Err(e @ MemoryError::Persistence(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(user = %user_id, fact = %candidate.fact, error = %e, "skipping extracted fact");
                }
            }
        }

        tracing::info!(user = %user_id, source, count = stored.len(), "facts extracted");
        Ok(stored)
    }

    /// Hybrid retrieval: up to half of `limit` by similarity to `query`, the
    /// rest filled from the user's most important facts, without duplicates.
    pub async fn retrieve_relevant(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let semantic_budget = limit.div_ceil(2);
        let semantic = if query.trim().is_empty() {
            Vec::new()
        } else {
            match self.store.semantic_search(user_id, query, semantic_budget).await {
                Ok(texts) => texts,
                // The importance floor still answers when embedding is down
                Err(MemoryError::Embedding(e)) => {
                    tracing::warn!(user = %user_id, error = %e, "semantic search unavailable");
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        };

        let important = self.store.by_importance(user_id, 0.0, limit).await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::with_capacity(limit);
        for text in semantic
            .into_iter()
            .chain(important.into_iter().map(|f| f.fact))
        {
            if results.len() == limit {
                break;
            }
            if seen.insert(text.clone()) {
                results.push(text);
            }
        }
        Ok(results)
    }

    /// Facts at or above `min_importance`, rendered as a context block.
    pub async fn build_context(
        &self,
        user_id: &str,
        min_importance: f64,
    ) -> Result<String, MemoryError> {
        let facts = self
            .store
            .by_importance(user_id, min_importance, self.config.context_fact_limit)
            .await?;
        Ok(render_context(&facts))
    }

    /// Standing preferences, constraints, and habits for drafting outgoing messages.
    pub async fn build_constraint_context(&self, user_id: &str) -> Result<String, MemoryError> {
        let facts = self
            .store
            .in_categories(
                user_id,
                &Category::CONSTRAINTS,
                self.config.constraint_min_importance,
                self.config.context_fact_limit,
            )
            .await?;
        Ok(render_context(&facts))
    }
}

/// Group facts under one heading per category, in [`Category::ALL`] order.
/// Within a category the input order is kept.
pub fn render_context(facts: &[MemoryFact]) -> String {
    if facts.is_empty() {
        return NO_PRIOR_CONTEXT.to_string();
    }

    let mut out = String::from(CONTEXT_HEADER);
    for category in Category::ALL {
        let mut section = facts.iter().filter(|f| f.category == category).peekable();
        if section.peek().is_none() {
            continue;
        }
        out.push_str("\n\n## ");
        out.push_str(category.heading());
        for fact in section {
            out.push_str("\n- ");
            out.push_str(&fact.fact);
        }
    }
    out
}
