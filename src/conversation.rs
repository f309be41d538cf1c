//! Durable conversation history keyed by an explicit conversation id.
//!
//! Each request loads its window of turns from SQLite and appends the turns
//! it produced; nothing is cached across requests.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::error::MemoryError;
use crate::llm::{ChatMessage, Role, ToolCall};
use crate::memory::store::now_timestamp;

#[derive(Clone)]
pub struct ConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// The most recent `window` turns, oldest first.
    pub async fn load(
        &self,
        user_id: &str,
        conversation_id: &str,
        window: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| load_turns(conn, &user_id, &conversation_id, window))
            .await
    }

    /// Append `turns` in one transaction.
    pub async fn append(
        &self,
        user_id: &str,
        conversation_id: &str,
        turns: Vec<ChatMessage>,
    ) -> Result<(), MemoryError> {
        if turns.is_empty() {
            return Ok(());
        }
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| append_turns(conn, &user_id, &conversation_id, &turns))
            .await
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

fn ensure_owner(conn: &Connection, user_id: &str, conversation_id: &str) -> Result<(), MemoryError> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM conversation_turns WHERE conversation_id = ?1 LIMIT 1",
            params![conversation_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        Some(owner) if owner != user_id => Err(MemoryError::Validation(format!(
            "conversation {conversation_id} belongs to another user"
        ))),
        _ => Ok(()),
    }
}

pub fn load_turns(
    conn: &Connection,
    user_id: &str,
    conversation_id: &str,
    window: usize,
) -> Result<Vec<ChatMessage>, MemoryError> {
    if conversation_id.trim().is_empty() {
        return Err(MemoryError::Validation("conversation id must not be empty".into()));
    }
    ensure_owner(conn, user_id, conversation_id)?;

    let mut stmt = conn.prepare(
        "SELECT role, content, tool_calls, tool_call_id FROM conversation_turns \
         WHERE conversation_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let mut turns = stmt
        .query_map(params![conversation_id, window as i64], |row| {
            let role: String = row.get(0)?;
            let tool_calls: Option<String> = row.get(2)?;
            Ok(ChatMessage {
                role: role.parse().unwrap_or(Role::User),
                content: row.get(1)?,
                tool_calls: tool_calls
                    .and_then(|raw| serde_json::from_str::<Vec<ToolCall>>(&raw).ok())
                    .unwrap_or_default(),
                tool_call_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    turns.reverse();

    // Observations whose assistant turn fell outside the window
    let orphaned = turns.iter().take_while(|t| t.role == Role::Tool).count();
    turns.drain(..orphaned);

    Ok(turns)
}

pub fn append_turns(
    conn: &mut Connection,
    user_id: &str,
    conversation_id: &str,
    turns: &[ChatMessage],
) -> Result<(), MemoryError> {
    if conversation_id.trim().is_empty() {
        return Err(MemoryError::Validation("conversation id must not be empty".into()));
    }

    let tx = conn.transaction()?;
    ensure_owner(&tx, user_id, conversation_id)?;

    let now = now_timestamp();
    for turn in turns {
        let tool_calls = if turn.tool_calls.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&turn.tool_calls)
                    .map_err(|e| MemoryError::Persistence(format!("tool calls not serializable: {e}")))?,
            )
        };
        tx.execute(
            "INSERT INTO conversation_turns (conversation_id, user_id, role, content, tool_calls, tool_call_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation_id,
                user_id,
                turn.role.as_str(),
                turn.content,
                tool_calls,
                turn.tool_call_id,
                now,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}
