use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CortexConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub google: GoogleConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: Option<f64>,
    pub max_tokens: u32,
}

/// How the agent gathers external context.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// The model selects tools itself.
    Tools,
    /// Keyword routing pre-fetches context; no tools are offered.
    Context,
}

/// Where the "approve before send/create" policy is enforced.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Policy lives in the system prompt only.
    Prompt,
    /// The tool executor also refuses gated tools without an approval turn.
    Strict,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub mode: AgentMode,
    pub max_iterations: usize,
    pub request_timeout_secs: Option<u64>,
    pub confirmation_gate: GateMode,
    pub history_window: usize,
    pub email_context_results: usize,
    pub calendar_context_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub context_min_importance: f64,
    pub constraint_min_importance: f64,
    pub context_fact_limit: usize,
    pub retrieval_limit: usize,
    pub dedup_threshold: f64,
    pub extract_every_turn: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GoogleConfig {
    pub gmail_base_url: String,
    pub calendar_base_url: String,
    pub calendar_id: String,
    pub access_token_env: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_cortex_dir()
            .join("cortex.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            dimensions: 1536,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: Some(0.3),
            max_tokens: 1024,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::Tools,
            max_iterations: 10,
            request_timeout_secs: Some(120),
            confirmation_gate: GateMode::Prompt,
            history_window: 40,
            email_context_results: 5,
            calendar_context_days: 7,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_min_importance: 0.0,
            constraint_min_importance: 0.7,
            context_fact_limit: 50,
            retrieval_limit: 5,
            dedup_threshold: 0.92,
            extract_every_turn: false,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            gmail_base_url: "https://gmail.googleapis.com/gmail/v1".into(),
            calendar_base_url: "https://www.googleapis.com/calendar/v3".into(),
            calendar_id: "primary".into(),
            access_token_env: "CORTEX_GOOGLE_ACCESS_TOKEN".into(),
        }
    }
}

/// Returns `~/.cortex/`
pub fn default_cortex_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cortex")
}

/// Returns the default config file path: `~/.cortex/config.toml`
pub fn default_config_path() -> PathBuf {
    default_cortex_dir().join("config.toml")
}

impl CortexConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CortexConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (CORTEX_DB, CORTEX_LOG_LEVEL, CORTEX_LLM_MODEL, CORTEX_AGENT_MODE).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CORTEX_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CORTEX_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("CORTEX_LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("CORTEX_AGENT_MODE") {
            match val.as_str() {
                "tools" => self.agent.mode = AgentMode::Tools,
                "context" => self.agent.mode = AgentMode::Context,
                other => tracing::warn!(mode = %other, "ignoring unknown CORTEX_AGENT_MODE"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
