//! Write and read paths for facts and their embeddings.
//!
//! [`store_fact`] runs the full write pipeline inside one transaction:
//! validation, dimension check, dedup gate, fact insert, embedding insert, and
//! audit log. Either the fact and its embedding both land or neither does.
//! [`delete_for_user`] removes embeddings before their facts in the same
//! transaction so no orphaned vector can survive.

use rusqlite::{params, Connection, Row, ToSql};
use serde_json::{Map, Value};

use super::types::{Category, MemoryFact};
use super::{cosine_threshold_to_l2, embedding_to_bytes};
use crate::db::migrations;
use crate::error::MemoryError;

const FACT_COLUMNS: &str =
    "f.id, f.user_id, f.fact, f.category, f.importance, f.metadata, f.created_at, f.updated_at";

/// A fact about to be written.
#[derive(Debug, Clone)]
pub struct NewFact<'a> {
    pub user_id: &'a str,
    pub fact: &'a str,
    pub category: Category,
    pub importance: f64,
    pub metadata: &'a Map<String, Value>,
}

/// Result returned from a store operation.
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    /// The stored fact, or the existing near-duplicate that absorbed it.
    pub fact: MemoryFact,
    /// `true` if an existing near-duplicate was updated instead of inserting.
    pub deduplicated: bool,
}

/// Reject facts that would break the table invariants.
pub fn validate_fact(user_id: &str, fact: &str, importance: f64) -> Result<(), MemoryError> {
    if user_id.trim().is_empty() {
        return Err(MemoryError::Validation("user id must not be empty".into()));
    }
    if fact.trim().is_empty() {
        return Err(MemoryError::Validation("fact text must not be empty".into()));
    }
    if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
        return Err(MemoryError::Validation(format!(
            "importance must be between 0.0 and 1.0, got {importance}"
        )));
    }
    Ok(())
}

/// Full write path: validate → dimension check → dedup gate → insert fact →
/// insert embedding → audit log, all in one transaction.
pub fn store_fact(
    conn: &mut Connection,
    new: &NewFact<'_>,
    embedding: &[f32],
    embedding_model: &str,
    dedup_threshold: f64,
) -> Result<StoreOutcome, MemoryError> {
    validate_fact(new.user_id, new.fact, new.importance)?;
    if embedding.is_empty() {
        return Err(MemoryError::Embedding("embedding is empty".into()));
    }

    let tx = conn.transaction()?;

    ensure_embedding_identity(&tx, embedding.len(), embedding_model)?;

    if let Some(existing_id) =
        check_dedup(&tx, new.user_id, new.category, embedding, dedup_threshold)?
    {
        let fact = update_dedup_match(&tx, &existing_id, new.importance)?;
        write_audit_log(
            &tx,
            "update",
            Some(new.user_id),
            Some(&existing_id),
            Some(&serde_json::json!({"reason": "deduplication", "incoming": new.fact})),
        )?;
        tx.commit()?;
        return Ok(StoreOutcome {
            fact,
            deduplicated: true,
        });
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    let metadata_json = serde_json::to_string(new.metadata)
        .map_err(|e| MemoryError::Validation(format!("metadata is not serializable: {e}")))?;

    tx.execute(
        "INSERT INTO memory_facts (id, user_id, fact, category, importance, metadata, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            new.user_id,
            new.fact.trim(),
            new.category.as_str(),
            new.importance,
            metadata_json,
            now,
        ],
    )?;

    insert_embedding(&tx, &id, embedding, &now)?;
    write_audit_log(&tx, "create", Some(new.user_id), Some(&id), None)?;

    tx.commit()?;

    Ok(StoreOutcome {
        fact: MemoryFact {
            id,
            user_id: new.user_id.to_string(),
            fact: new.fact.trim().to_string(),
            category: new.category,
            importance: new.importance,
            metadata: new.metadata.clone(),
            created_at: now.clone(),
            updated_at: now,
        },
        deduplicated: false,
    })
}

/// Facts at or above `min_importance`, importance descending, newest first on ties.
pub fn facts_by_importance(
    conn: &Connection,
    user_id: &str,
    min_importance: f64,
    limit: usize,
) -> Result<Vec<MemoryFact>, MemoryError> {
    let sql = format!(
        "SELECT {FACT_COLUMNS} FROM memory_facts f \
         WHERE f.user_id = ?1 AND f.importance >= ?2 \
         ORDER BY f.importance DESC, f.created_at DESC, f.rowid DESC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let facts = stmt
        .query_map(params![user_id, min_importance, limit as i64], row_to_fact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Like [`facts_by_importance`], restricted to `categories`.
pub fn facts_in_categories(
    conn: &Connection,
    user_id: &str,
    categories: &[Category],
    min_importance: f64,
    limit: usize,
) -> Result<Vec<MemoryFact>, MemoryError> {
    if categories.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (0..categories.len()).map(|i| format!("?{}", i + 4)).collect();
    let sql = format!(
        "SELECT {FACT_COLUMNS} FROM memory_facts f \
         WHERE f.user_id = ?1 AND f.importance >= ?2 AND f.category IN ({}) \
         ORDER BY f.importance DESC, f.created_at DESC, f.rowid DESC LIMIT ?3",
        placeholders.join(", ")
    );

    let limit = limit as i64;
    let category_strs: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    let mut bound: Vec<&dyn ToSql> = vec![&user_id, &min_importance, &limit];
    bound.extend(category_strs.iter().map(|c| c as &dyn ToSql));

    let mut stmt = conn.prepare(&sql)?;
    let facts = stmt
        .query_map(bound.as_slice(), row_to_fact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Rank the user's facts by L2 distance to `query_embedding`, closest first.
///
/// Returns `(fact, distance)` pairs. Empty when the user has no facts.
/// `embedding_model` names the model that produced `query_embedding`.
pub fn semantic_search(
    conn: &Connection,
    user_id: &str,
    query_embedding: &[f32],
    embedding_model: &str,
    limit: usize,
) -> Result<Vec<(MemoryFact, f64)>, MemoryError> {
    match migrations::get_embedding_dimensions(conn)? {
        None => return Ok(Vec::new()),
        Some(dims) if dims != query_embedding.len() => {
            return Err(MemoryError::Embedding(format!(
                "query embedding has {} dimensions but the store holds {dims}",
                query_embedding.len()
            )));
        }
        Some(_) => {}
    }
    if let Some(stored) = migrations::get_embedding_model(conn)? {
        if stored != embedding_model {
            return Err(MemoryError::Embedding(format!(
                "query embedding comes from '{embedding_model}' but the store holds '{stored}'"
            )));
        }
    }

    let sql = format!(
        "SELECT {FACT_COLUMNS}, vec_distance_l2(e.embedding, ?2) AS distance \
         FROM memory_facts f JOIN memory_embeddings e ON e.fact_id = f.id \
         WHERE f.user_id = ?1 \
         ORDER BY distance ASC, f.created_at DESC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let results = stmt
        .query_map(
            params![user_id, embedding_to_bytes(query_embedding), limit as i64],
            |row| Ok((row_to_fact(row)?, row.get::<_, f64>(8)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results)
}

/// Delete every fact of `user_id` except those in `excluding`, embeddings first.
///
/// Returns the number of facts deleted.
pub fn delete_for_user(
    conn: &mut Connection,
    user_id: &str,
    excluding: &[Category],
) -> Result<usize, MemoryError> {
    let tx = conn.transaction()?;

    let excluded: Vec<&str> = excluding.iter().map(|c| c.as_str()).collect();
    let keep_clause = if excluded.is_empty() {
        String::new()
    } else {
        let placeholders: Vec<String> = (0..excluded.len()).map(|i| format!("?{}", i + 2)).collect();
        format!(" AND category NOT IN ({})", placeholders.join(", "))
    };
    let mut bound: Vec<&dyn ToSql> = vec![&user_id];
    bound.extend(excluded.iter().map(|c| c as &dyn ToSql));

    // 1. Embeddings of the doomed facts
    tx.execute(
        &format!(
            "DELETE FROM memory_embeddings WHERE fact_id IN \
             (SELECT id FROM memory_facts WHERE user_id = ?1{keep_clause})"
        ),
        bound.as_slice(),
    )?;

    // 2. The facts themselves
    let deleted = tx.execute(
        &format!("DELETE FROM memory_facts WHERE user_id = ?1{keep_clause}"),
        bound.as_slice(),
    )?;

    write_audit_log(
        &tx,
        "delete",
        Some(user_id),
        None,
        Some(&serde_json::json!({"deleted": deleted, "kept_categories": excluded})),
    )?;

    tx.commit()?;
    Ok(deleted)
}

/// Every fact in the store as `(id, text)`, oldest first. Used by re-embedding.
pub fn all_fact_texts(conn: &Connection) -> Result<Vec<(String, String)>, MemoryError> {
    let mut stmt = conn.prepare("SELECT id, fact FROM memory_facts ORDER BY created_at, rowid")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace every stored embedding in one transaction and record the new
/// model and dimension. Facts missing from `embeddings` keep no vector, so
/// callers must pass one entry per fact.
pub fn replace_all_embeddings(
    conn: &mut Connection,
    embeddings: &[(String, Vec<f32>)],
    embedding_model: &str,
    dimensions: usize,
) -> Result<usize, MemoryError> {
    if let Some((id, bad)) = embeddings.iter().find(|(_, e)| e.len() != dimensions) {
        return Err(MemoryError::Embedding(format!(
            "embedding for fact {id} has {} dimensions, expected {dimensions}",
            bad.len()
        )));
    }

    let tx = conn.transaction()?;
    let now = now_timestamp();

    tx.execute("DELETE FROM memory_embeddings", [])?;
    for (fact_id, embedding) in embeddings {
        insert_embedding(&tx, fact_id, embedding, &now)?;
    }

    let orphans: i64 = tx.query_row(
        "SELECT COUNT(*) FROM memory_facts f \
         WHERE NOT EXISTS (SELECT 1 FROM memory_embeddings e WHERE e.fact_id = f.id)",
        [],
        |row| row.get(0),
    )?;
    if orphans > 0 {
        return Err(MemoryError::Validation(format!(
            "{orphans} facts would be left without an embedding"
        )));
    }

    migrations::set_embedding_identity(&tx, embedding_model, dimensions)?;
    write_audit_log(
        &tx,
        "re_embed",
        None,
        None,
        Some(&serde_json::json!({"model": embedding_model, "dimensions": dimensions, "facts": embeddings.len()})),
    )?;

    tx.commit()?;
    Ok(embeddings.len())
}

/// Refuse vectors from another model or of another size; record the identity on first write.
fn ensure_embedding_identity(
    conn: &Connection,
    dimensions: usize,
    embedding_model: &str,
) -> Result<(), MemoryError> {
    match migrations::get_embedding_dimensions(conn)? {
        Some(stored) if stored != dimensions => Err(MemoryError::Validation(format!(
            "embedding has {dimensions} dimensions but the store holds {stored}-dimensional \
             vectors; run `cortex re-embed` after changing embedding providers"
        ))),
        Some(_) => match migrations::get_embedding_model(conn)? {
            Some(stored) if stored != embedding_model => Err(MemoryError::Validation(format!(
                "embedding comes from '{embedding_model}' but the store holds vectors from \
                 '{stored}'; run `cortex re-embed` after changing embedding providers"
            ))),
            _ => Ok(()),
        },
        None => {
            migrations::set_embedding_identity(conn, embedding_model, dimensions)?;
            Ok(())
        }
    }
}

/// Find an existing fact of the same user and category within the dedup threshold.
fn check_dedup(
    conn: &Connection,
    user_id: &str,
    category: Category,
    embedding: &[f32],
    threshold: f64,
) -> Result<Option<String>, MemoryError> {
    let max_distance = cosine_threshold_to_l2(threshold);

    let mut stmt = conn.prepare(
        "SELECT f.id, vec_distance_l2(e.embedding, ?1) AS distance \
         FROM memory_facts f JOIN memory_embeddings e ON e.fact_id = f.id \
         WHERE f.user_id = ?2 AND f.category = ?3 \
         ORDER BY distance ASC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(
        params![embedding_to_bytes(embedding), user_id, category.as_str()],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
    )?;

    match rows.next().transpose()? {
        Some((id, distance)) if distance <= max_distance => Ok(Some(id)),
        _ => Ok(None),
    }
}

/// Raise an existing fact's importance to the incoming value if higher and touch it.
fn update_dedup_match(
    conn: &Connection,
    fact_id: &str,
    importance: f64,
) -> Result<MemoryFact, MemoryError> {
    conn.execute(
        "UPDATE memory_facts SET updated_at = ?1, importance = MAX(importance, ?2) WHERE id = ?3",
        params![now_timestamp(), importance, fact_id],
    )?;
    let fact = conn.query_row(
        &format!("SELECT {FACT_COLUMNS} FROM memory_facts f WHERE f.id = ?1"),
        params![fact_id],
        row_to_fact,
    )?;
    Ok(fact)
}

fn insert_embedding(
    conn: &Connection,
    fact_id: &str,
    embedding: &[f32],
    now: &str,
) -> Result<(), MemoryError> {
    conn.execute(
        "INSERT INTO memory_embeddings (id, fact_id, dimensions, embedding, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::now_v7().to_string(),
            fact_id,
            embedding.len() as i64,
            embedding_to_bytes(embedding),
            now,
        ],
    )?;
    Ok(())
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    user_id: Option<&str>,
    fact_id: Option<&str>,
    details: Option<&Value>,
) -> Result<(), MemoryError> {
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO memory_log (operation, user_id, fact_id, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![operation, user_id, fact_id, details_json, now_timestamp()],
    )?;
    Ok(())
}

/// Fixed-width RFC 3339 so timestamps sort lexicographically.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<MemoryFact> {
    let category: String = row.get(3)?;
    let metadata: Option<String> = row.get(5)?;
    Ok(MemoryFact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        fact: row.get(2)?,
        category: category.parse().unwrap_or(Category::Other),
        importance: row.get(4)?,
        metadata: metadata
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
