//! Async facade over the synchronous store.
//!
//! Embedding calls are awaited on the runtime; every SQLite operation is
//! moved to the blocking pool behind the shared connection mutex.

use rusqlite::Connection;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

use super::store::{self, NewFact, StoreOutcome};
use super::types::{Category, MemoryFact};
use crate::embedding::EmbeddingProvider;
use crate::error::MemoryError;

#[derive(Clone)]
pub struct FactStore {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    dedup_threshold: f64,
}

impl FactStore {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedder: Arc<dyn EmbeddingProvider>,
        dedup_threshold: f64,
    ) -> Self {
        Self {
            db,
            embedder,
            dedup_threshold,
        }
    }

    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed `fact` and persist it with its embedding atomically.
    ///
    /// Input is validated before the embedding call so a rejected fact never
    /// costs a provider request. No fact is written if embedding fails.
    pub async fn store(
        &self,
        user_id: &str,
        fact: &str,
        category: Category,
        importance: f64,
        metadata: Map<String, Value>,
    ) -> Result<StoreOutcome, MemoryError> {
        store::validate_fact(user_id, fact, importance)?;

        let embedding = self.embed(fact).await?;

        let user_id = user_id.to_string();
        let fact = fact.to_string();
        let model = self.embedder.model().to_string();
        let dedup_threshold = self.dedup_threshold;

        let outcome = self
            .with_conn(move |conn| {
                store::store_fact(
                    conn,
                    &NewFact {
                        user_id: &user_id,
                        fact: &fact,
                        category,
                        importance,
                        metadata: &metadata,
                    },
                    &embedding,
                    &model,
                    dedup_threshold,
                )
            })
            .await?;

        tracing::info!(
            user = %outcome.fact.user_id,
            id = %outcome.fact.id,
            category = %outcome.fact.category,
            deduplicated = outcome.deduplicated,
            "fact stored"
        );
        Ok(outcome)
    }

    /// Texts of the `limit` facts closest to `query`, nearest first.
    pub async fn semantic_search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query.trim().is_empty() {
            return Err(MemoryError::Validation("search query must not be empty".into()));
        }

        let query_embedding = self.embed(query).await?;
        let user_id = user_id.to_string();
        let model = self.embedder.model().to_string();

        let ranked = self
            .with_conn(move |conn| {
                store::semantic_search(conn, &user_id, &query_embedding, &model, limit)
            })
            .await?;

        Ok(ranked.into_iter().map(|(fact, _)| fact.fact).collect())
    }

    pub async fn by_importance(
        &self,
        user_id: &str,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<MemoryFact>, MemoryError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| store::facts_by_importance(conn, &user_id, min_importance, limit))
            .await
    }

    pub async fn in_categories(
        &self,
        user_id: &str,
        categories: &'static [Category],
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<MemoryFact>, MemoryError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            store::facts_in_categories(conn, &user_id, categories, min_importance, limit)
        })
        .await
    }

    /// Erase the user's facts, keeping those whose category is in `excluding`.
    pub async fn delete_for_user(
        &self,
        user_id: &str,
        excluding: &[Category],
    ) -> Result<usize, MemoryError> {
        let user = user_id.to_string();
        let excluding = excluding.to_vec();
        let deleted = self
            .with_conn(move |conn| store::delete_for_user(conn, &user, &excluding))
            .await?;

        tracing::info!(user = %user_id, deleted, "facts erased");
        Ok(deleted)
    }

    /// Recompute every stored embedding with the current provider and swap
    /// them in with one transaction. `on_batch` receives the size of each
    /// embedded batch. Returns the number of facts re-embedded.
    pub async fn re_embed<F>(&self, batch_size: usize, on_batch: F) -> Result<usize, MemoryError>
    where
        F: Fn(usize) + Send,
    {
        let facts = self.with_conn(|conn| store::all_fact_texts(conn)).await?;
        let dimensions = self.embedder.dimensions();

        let mut embeddings: Vec<(String, Vec<f32>)> = Vec::with_capacity(facts.len());
        for chunk in facts.chunks(batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| MemoryError::Embedding(format!("{e:#}")))?;
            if vectors.len() != chunk.len() {
                return Err(MemoryError::Embedding(format!(
                    "provider returned {} vectors for {} facts",
                    vectors.len(),
                    chunk.len()
                )));
            }
            embeddings.extend(chunk.iter().map(|(id, _)| id.clone()).zip(vectors));
            on_batch(chunk.len());
        }

        let model = self.embedder.model().to_string();
        let model_for_log = model.clone();
        let count = self
            .with_conn(move |conn| store::replace_all_embeddings(conn, &embeddings, &model, dimensions))
            .await?;

        tracing::info!(model = %model_for_log, dimensions, count, "store re-embedded");
        Ok(count)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| MemoryError::Embedding(format!("{e:#}")))?;

        if embedding.len() != self.embedder.dimensions() {
            return Err(MemoryError::Embedding(format!(
                "provider returned {} dimensions, expected {}",
                embedding.len(),
                self.embedder.dimensions()
            )));
        }
        Ok(embedding)
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, MemoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MemoryError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| MemoryError::Persistence(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }
}
