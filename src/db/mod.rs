pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the Cortex database at the given path, with sqlite-vec
/// loaded and the schema migrated to the current version.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets concurrent requests read while one writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Embedding identity recorded in the store versus the configured provider.
#[derive(Debug, Serialize)]
pub struct EmbeddingIdentityReport {
    pub stored_model: Option<String>,
    pub stored_dimensions: Option<usize>,
    pub configured_model: String,
    pub configured_dimensions: usize,
}

impl EmbeddingIdentityReport {
    /// `true` when stored vectors were produced by a different model or size.
    pub fn needs_re_embed(&self) -> bool {
        let model_changed = self
            .stored_model
            .as_deref()
            .is_some_and(|m| m != self.configured_model);
        let dims_changed = self
            .stored_dimensions
            .is_some_and(|d| d != self.configured_dimensions);
        model_changed || dims_changed
    }
}

/// Compare the store's recorded embedding identity with the configured one.
pub fn check_embedding_identity(
    conn: &Connection,
    configured_model: &str,
    configured_dimensions: usize,
) -> Result<EmbeddingIdentityReport> {
    Ok(EmbeddingIdentityReport {
        stored_model: migrations::get_embedding_model(conn)?,
        stored_dimensions: migrations::get_embedding_dimensions(conn)?,
        configured_model: configured_model.to_string(),
        configured_dimensions,
    })
}
