//! Persistence for C7's inputs: `LogicTemplate` and `FlexMessage` (§3).
//! `linebot-logic` is deliberately I/O-free, so the orchestrator owns the
//! store the same way it owns every other per-concern SQLite file.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::instrument;

use linebot_logic::{Block, FlexMessageLookup, LogicTemplate};

pub type Result<T> = std::result::Result<T, rusqlite::Error>;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS logic_templates (
            id          TEXT PRIMARY KEY,
            bot_id      TEXT NOT NULL,
            name        TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            logic_blocks TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_logic_templates_bot ON logic_templates(bot_id, is_active);
        CREATE TABLE IF NOT EXISTS flex_messages (
            id          TEXT PRIMARY KEY,
            owner_id    TEXT NOT NULL,
            content     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_flex_messages_owner ON flex_messages(owner_id);",
    )
}

pub struct TemplateStore {
    db: Arc<Mutex<Connection>>,
}

impl TemplateStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Active templates for a bot, newest-updated first — `engine::evaluate`
    /// re-sorts defensively, but this keeps cold-path reads cheap.
    #[instrument(skip(self))]
    pub fn active_for_bot(&self, bot_id: &str) -> Result<Vec<LogicTemplate>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, bot_id, name, is_active, logic_blocks, updated_at
             FROM logic_templates WHERE bot_id = ?1 AND is_active = 1
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![bot_id], row_to_template)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn upsert(&self, template: &LogicTemplate) -> Result<()> {
        let blocks = serde_json::to_string(&template.logic_blocks).unwrap_or_else(|_| "[]".to_string());
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO logic_templates (id, bot_id, name, is_active, logic_blocks, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, is_active = excluded.is_active,
                logic_blocks = excluded.logic_blocks, updated_at = excluded.updated_at",
            params![
                template.id,
                template.bot_id,
                template.name,
                template.is_active as i32,
                blocks,
                template.updated_at,
            ],
        )?;
        Ok(())
    }
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogicTemplate> {
    let blocks_str: String = row.get(4)?;
    let blocks: Vec<Block> = serde_json::from_str(&blocks_str).unwrap_or_default();
    Ok(LogicTemplate {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
        logic_blocks: blocks,
        updated_at: row.get(5)?,
    })
}

/// `FlexMessage` store plus the `FlexMessageLookup` impl C7 calls into.
pub struct FlexMessageStore {
    db: Arc<Mutex<Connection>>,
}

impl FlexMessageStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn upsert(&self, id: &str, owner_id: &str, content: &Value) -> Result<()> {
        let content_str = serde_json::to_string(content).unwrap_or_else(|_| "{}".to_string());
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO flex_messages (id, owner_id, content) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, content = excluded.content",
            params![id, owner_id, content_str],
        )?;
        Ok(())
    }

    fn get(&self, owner_id: &str, id: &str) -> Option<Value> {
        let db = self.db.lock().unwrap();
        let content_str: Option<String> = db
            .query_row(
                "SELECT content FROM flex_messages WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();
        content_str.and_then(|s| serde_json::from_str(&s).ok())
    }
}

impl FlexMessageLookup for FlexMessageStore {
    fn get(&self, owner_id: &str, flex_message_id: &str) -> Option<Value> {
        FlexMessageStore::get(self, owner_id, flex_message_id)
    }
}
