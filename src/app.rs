//! Wiring: open the store, build collaborators, and hand out an [`Agent`].

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

use crate::agent::Agent;
use crate::config::{CortexConfig, GoogleConfig};
use crate::conversation::ConversationStore;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::integrations::google::{GoogleCalendar, GoogleMail};
use crate::integrations::{CalendarClient, Disconnected, MailClient};
use crate::llm::{self, LanguageModel};
use crate::memory::fact_store::FactStore;
use crate::memory::service::MemoryService;

/// Shared state for one process.
pub struct App {
    pub config: Arc<CortexConfig>,
    pub facts: Arc<FactStore>,
    pub memory: Arc<MemoryService>,
    pub conversations: ConversationStore,
    model: Arc<dyn LanguageModel>,
}

impl App {
    /// Open the database and create the configured providers.
    pub fn open(config: CortexConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let report =
            db::check_embedding_identity(&conn, &config.embedding.model, config.embedding.dimensions)?;
        if report.needs_re_embed() {
            tracing::warn!(
                stored_model = ?report.stored_model,
                stored_dimensions = ?report.stored_dimensions,
                configured_model = %report.configured_model,
                configured_dimensions = report.configured_dimensions,
                "embedding provider changed; run `cortex re-embed` before storing or searching facts"
            );
        }

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(
            embedding::create_provider(&config.embedding)
                .context("failed to create embedding provider")?,
        );
        let model = llm::create_model(&config.llm).context("failed to create language model")?;

        Ok(Self::from_parts(config, conn, embedder, model))
    }

    /// Assemble from already-built parts.
    pub fn from_parts(
        config: CortexConfig,
        conn: rusqlite::Connection,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let facts = Arc::new(FactStore::new(
            Arc::clone(&db),
            embedder,
            config.memory.dedup_threshold,
        ));
        let memory = Arc::new(MemoryService::new(
            Arc::clone(&facts),
            Arc::clone(&model),
            config.memory.clone(),
        ));
        let conversations = ConversationStore::new(db);

        Self {
            config: Arc::new(config),
            facts,
            memory,
            conversations,
            model,
        }
    }

    /// Build an agent using the configured Google account, or stand-ins
    /// when no access token is present.
    pub fn agent(&self) -> Result<Agent> {
        let (mail, calendar) = connect_google(&self.config.google)?;
        Ok(self.agent_with(mail, calendar))
    }

    pub fn agent_with(&self, mail: Arc<dyn MailClient>, calendar: Arc<dyn CalendarClient>) -> Agent {
        Agent::new(
            Arc::clone(&self.model),
            Arc::clone(&self.memory),
            mail,
            calendar,
            self.conversations.clone(),
            self.config.agent.clone(),
        )
    }
}

fn connect_google(
    config: &GoogleConfig,
) -> Result<(Arc<dyn MailClient>, Arc<dyn CalendarClient>)> {
    if std::env::var(&config.access_token_env).is_err() {
        tracing::info!(
            env = %config.access_token_env,
            "no Google access token; email and calendar tools will report not connected"
        );
        return Ok((Arc::new(Disconnected), Arc::new(Disconnected)));
    }
    Ok((
        Arc::new(GoogleMail::new(config)?),
        Arc::new(GoogleCalendar::new(config)?),
    ))
}
