//! SQL DDL for the base Cortex tables.
//!
//! Defines `memory_facts`, `memory_embeddings`, `memory_log`, and
//! `schema_meta`. Later tables arrive through [`super::migrations`]. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Durable user facts
CREATE TABLE IF NOT EXISTS memory_facts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    fact TEXT NOT NULL CHECK(length(trim(fact)) > 0),
    category TEXT NOT NULL CHECK(category IN ('preference','habit','project','relationship','constraint','event','personal','other')),
    importance REAL NOT NULL DEFAULT 0.5 CHECK(importance >= 0.0 AND importance <= 1.0),
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_user ON memory_facts(user_id);
CREATE INDEX IF NOT EXISTS idx_facts_user_importance ON memory_facts(user_id, importance DESC, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_facts_user_category ON memory_facts(user_id, category);

-- One embedding per fact; float32 little-endian blob
CREATE TABLE IF NOT EXISTS memory_embeddings (
    id TEXT PRIMARY KEY,
    fact_id TEXT NOT NULL UNIQUE REFERENCES memory_facts(id) ON DELETE CASCADE,
    dimensions INTEGER NOT NULL CHECK(dimensions > 0),
    embedding BLOB NOT NULL CHECK(length(embedding) = dimensions * 4),
    created_at TEXT NOT NULL
);

-- Audit log
CREATE TABLE IF NOT EXISTS memory_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','update','delete','re_embed')),
    user_id TEXT,
    fact_id TEXT,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize the base tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
