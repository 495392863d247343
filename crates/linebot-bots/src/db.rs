use rusqlite::{Connection, Result};

use crate::types::Bot;

/// Map a SELECT row (column order from `BOT_SELECT_SQL`) to a Bot.
/// Centralised here so every query in this crate stays consistent.
pub(crate) fn row_to_bot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bot> {
    Ok(Bot {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        channel_token: row.get(2)?,
        channel_secret: row.get(3)?,
        ai_takeover_enabled: row.get::<_, i32>(4)? != 0,
        ai_provider: row.get(5)?,
        ai_model: row.get(6)?,
        ai_system_prompt: row.get(7)?,
        ai_rag_threshold: row.get(8)?,
        ai_rag_top_k: row.get::<_, i64>(9)? as u32,
        ai_history_messages: row.get::<_, i64>(10)? as u32,
        ai_retrieval_mode: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Initialise all tables for the bots subsystem. Safe to call on every
/// startup — CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_bots_table(conn)
}

fn create_bots_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bots (
            id                      TEXT PRIMARY KEY NOT NULL,
            owner_id                TEXT NOT NULL,
            channel_token           TEXT,
            channel_secret          TEXT,
            ai_takeover_enabled     INTEGER NOT NULL DEFAULT 0,
            ai_provider             TEXT,
            ai_model                TEXT,
            ai_system_prompt        TEXT,
            ai_rag_threshold        REAL NOT NULL DEFAULT 0.7,
            ai_rag_top_k            INTEGER NOT NULL DEFAULT 5,
            ai_history_messages     INTEGER NOT NULL DEFAULT 0,
            ai_retrieval_mode       TEXT NOT NULL DEFAULT 'vector_only',
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bots_owner ON bots (owner_id);",
    )
}

pub(crate) const BOT_SELECT_SQL: &str = "SELECT id, owner_id, channel_token, channel_secret,
        ai_takeover_enabled, ai_provider, ai_model, ai_system_prompt,
        ai_rag_threshold, ai_rag_top_k, ai_history_messages, ai_retrieval_mode, created_at, updated_at
     FROM bots WHERE id = ?1";

pub(crate) const BOT_SELECT_BY_OWNER_SQL: &str = "SELECT id, owner_id, channel_token, channel_secret,
        ai_takeover_enabled, ai_provider, ai_model, ai_system_prompt,
        ai_rag_threshold, ai_rag_top_k, ai_history_messages, ai_retrieval_mode, created_at, updated_at
     FROM bots WHERE owner_id = ?1 ORDER BY created_at ASC";
