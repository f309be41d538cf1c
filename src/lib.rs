//! Cortex: a personal chief-of-staff agent backend with long-term memory.
//!
//! A chat request runs through an agent loop that alternates between asking a
//! language model and executing the tools it requests (inbox search, calendar,
//! memory, sending email, creating events) until the model answers. A fact
//! store keeps what the user has told it, so later turns can be tailored.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   distance functions over L2-normalized embeddings
//! - **Embeddings**: any OpenAI-compatible `/embeddings` endpoint
//! - **Models**: any OpenAI-compatible `/chat/completions` endpoint with function tools
//! - **Integrations**: Gmail and Google Calendar REST APIs
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: database initialization, schema, and migrations
//! - [`embedding`]: text-to-vector providers
//! - [`memory`]: fact store, extraction, and context rendering
//! - [`llm`]: conversation types and the language model seam
//! - [`integrations`]: mail and calendar collaborators
//! - [`tools`]: the fixed tool registry and approval gate
//! - [`agent`]: context assembly and the Model/Tools loop
//! - [`conversation`]: durable per-conversation history

pub mod agent;
pub mod app;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod tools;
