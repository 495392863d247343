use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::BOT_SELECT_SQL;
use crate::error::{BotError, Result};
use crate::types::{Bot, NewBot};

/// Insert a brand-new bot row. The id is generated here so the caller
/// immediately has the canonical id without a follow-up query.
pub fn create_bot(conn: &Connection, new: NewBot) -> Result<Bot> {
    let now = Utc::now().to_rfc3339();
    let bot = Bot {
        id: Uuid::now_v7().to_string(),
        owner_id: new.owner_id,
        channel_token: new.channel_token,
        channel_secret: new.channel_secret,
        ai_takeover_enabled: new.ai_takeover_enabled,
        ai_provider: new.ai_provider,
        ai_model: new.ai_model,
        ai_system_prompt: new.ai_system_prompt,
        ai_rag_threshold: new.ai_rag_threshold,
        ai_rag_top_k: new.ai_rag_top_k,
        ai_history_messages: new.ai_history_messages,
        ai_retrieval_mode: new.ai_retrieval_mode,
        created_at: now.clone(),
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO bots (
            id, owner_id, channel_token, channel_secret, ai_takeover_enabled,
            ai_provider, ai_model, ai_system_prompt, ai_rag_threshold,
            ai_rag_top_k, ai_history_messages, ai_retrieval_mode, created_at, updated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            bot.id,
            bot.owner_id,
            bot.channel_token,
            bot.channel_secret,
            bot.ai_takeover_enabled as i32,
            bot.ai_provider,
            bot.ai_model,
            bot.ai_system_prompt,
            bot.ai_rag_threshold,
            bot.ai_rag_top_k,
            bot.ai_history_messages,
            bot.ai_retrieval_mode,
            bot.created_at,
            bot.updated_at,
        ],
    )?;
    Ok(bot)
}

/// List every bot owned by a tenant, oldest first. Used by the dashboard
/// WebSocket scope to discover and subscribe to all of a user's bots.
pub fn list_bots_by_owner(conn: &Connection, owner_id: &str) -> Result<Vec<Bot>> {
    let mut stmt = conn.prepare(crate::db::BOT_SELECT_BY_OWNER_SQL)?;
    let rows = stmt.query_map(params![owner_id], crate::db::row_to_bot)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Load a bot by primary key. Returns None instead of an error when absent
/// so callers (e.g. the webhook handler) decide whether that is a 404.
pub fn get_bot(conn: &Connection, bot_id: &str) -> Result<Option<Bot>> {
    let mut stmt = conn.prepare(BOT_SELECT_SQL)?;
    match stmt.query_row(params![bot_id], crate::db::row_to_bot) {
        Ok(b) => Ok(Some(b)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(BotError::DatabaseError(e)),
    }
}

/// Replace the channel token/secret pair on an existing bot. Used by the
/// owner-facing rotation flow; takes effect immediately for the next
/// webhook verification.
pub fn rotate_credentials(
    conn: &Connection,
    bot_id: &str,
    channel_token: &str,
    channel_secret: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE bots SET channel_token=?2, channel_secret=?3, updated_at=?4 WHERE id=?1",
        params![bot_id, channel_token, channel_secret, now],
    )?;
    if rows == 0 {
        return Err(BotError::NotFound(bot_id.to_string()));
    }
    Ok(())
}

/// Update the AI-takeover configuration block. Every field is overwritten —
/// callers read-modify-write the full `Bot` returned by `get_bot`.
pub fn update_ai_settings(conn: &Connection, bot: &Bot) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE bots SET
            ai_takeover_enabled=?2, ai_provider=?3, ai_model=?4, ai_system_prompt=?5,
            ai_rag_threshold=?6, ai_rag_top_k=?7, ai_history_messages=?8,
            ai_retrieval_mode=?9, updated_at=?10
         WHERE id=?1",
        params![
            bot.id,
            bot.ai_takeover_enabled as i32,
            bot.ai_provider,
            bot.ai_model,
            bot.ai_system_prompt,
            bot.ai_rag_threshold,
            bot.ai_rag_top_k,
            bot.ai_history_messages,
            bot.ai_retrieval_mode,
            now,
        ],
    )?;
    if rows == 0 {
        return Err(BotError::NotFound(bot.id.clone()));
    }
    Ok(())
}
