use rusqlite::{Connection, Row};

use crate::error::Result;
use crate::types::{AdminIdentity, Conversation, Message, SenderType};

/// Initialise the conversations/messages tables and their indexes.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id            TEXT PRIMARY KEY,
            bot_id        TEXT NOT NULL,
            line_user_id  TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            UNIQUE(bot_id, line_user_id)
        );
        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL,
            bot_id           TEXT NOT NULL,
            line_user_id     TEXT NOT NULL,
            line_message_id  TEXT,
            event_type       TEXT NOT NULL,
            message_type     TEXT NOT NULL,
            content           TEXT NOT NULL,
            sender_type      TEXT NOT NULL,
            admin_id         TEXT,
            admin_username   TEXT,
            admin_full_name  TEXT,
            timestamp        TEXT NOT NULL,
            media_url        TEXT,
            media_path       TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedup
            ON messages(bot_id, line_message_id)
            WHERE line_message_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_messages_conversation_timestamp
            ON messages(conversation_id, timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_conversations_bot_user
            ON conversations(bot_id, line_user_id);",
    )?;
    Ok(())
}

pub const MESSAGE_SELECT_SQL: &str = "SELECT
        id, conversation_id, line_message_id, event_type, message_type,
        content, sender_type, admin_id, admin_username, admin_full_name,
        timestamp, media_url, media_path
    FROM messages";

pub fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        line_user_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let content_str: String = row.get(5)?;
    let content = serde_json::from_str(&content_str).unwrap_or(serde_json::Value::Null);
    let sender_str: String = row.get(6)?;
    let sender_type = sender_str.parse().unwrap_or(SenderType::User);

    let admin_id: Option<String> = row.get(7)?;
    let admin_user = admin_id.map(|id| AdminIdentity {
        id,
        username: row.get(8).unwrap_or_default(),
        full_name: row.get(9).unwrap_or_default(),
    });

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        line_message_id: row.get(2)?,
        event_type: row.get(3)?,
        message_type: row.get(4)?,
        content,
        sender_type,
        admin_user,
        timestamp: row.get(10)?,
        media_url: row.get(11)?,
        media_path: row.get(12)?,
    })
}
