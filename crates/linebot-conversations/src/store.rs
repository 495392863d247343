use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::{row_to_conversation, row_to_message, MESSAGE_SELECT_SQL};
use crate::error::{ConversationError, Result};
use crate::types::{AdminIdentity, Conversation, InboundEvent, Message, SenderFilter, SenderType};

/// Front for the `conversations`/`messages` tables.
///
/// A conversation is uniquely identified by (bot_id, line_user_id) and is
/// created lazily on first contact. Every append goes through this store so
/// dedup and ordering stay centralized.
pub struct ConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Return the conversation for (bot_id, line_user_id), creating it if
    /// this is the first contact from this LINE user.
    #[instrument(skip(self), fields(bot_id, line_user_id))]
    pub fn get_or_create(&self, bot_id: &str, line_user_id: &str) -> Result<Conversation> {
        if let Some(conv) = self.find(bot_id, line_user_id)? {
            return Ok(conv);
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO conversations (id, bot_id, line_user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, bot_id, line_user_id, now],
        )?;

        db.query_row(
            "SELECT id, bot_id, line_user_id, created_at, updated_at
             FROM conversations WHERE bot_id = ?1 AND line_user_id = ?2",
            params![bot_id, line_user_id],
            row_to_conversation,
        )
        .map_err(ConversationError::from)
    }

    fn find(&self, bot_id: &str, line_user_id: &str) -> Result<Option<Conversation>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, bot_id, line_user_id, created_at, updated_at
             FROM conversations WHERE bot_id = ?1 AND line_user_id = ?2",
            params![bot_id, line_user_id],
            row_to_conversation,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ConversationError::Database(e)),
        }
    }

    /// Append a user-authored event, deduplicating on (bot_id, line_message_id)
    /// when LINE supplies a message id. Returns `(message, is_new)` — when
    /// `is_new` is false the caller must still ACK the webhook but must not
    /// re-trigger downstream side effects (media fetch, logic engine, reply).
    #[instrument(skip(self, event), fields(bot_id, line_user_id))]
    pub fn append_user(
        &self,
        bot_id: &str,
        line_user_id: &str,
        event: InboundEvent,
    ) -> Result<(Message, bool)> {
        let conversation = self.get_or_create(bot_id, line_user_id)?;

        if let Some(ref line_message_id) = event.line_message_id {
            if let Some(existing) = self.find_by_line_message_id(bot_id, line_message_id)? {
                debug!(line_message_id, "duplicate message, skipping insert");
                return Ok((existing, false));
            }
        }

        let message = self.insert_message(
            &conversation.id,
            event.line_message_id,
            &event.event_type,
            &event.message_type,
            &event.content,
            SenderType::User,
            None,
        )?;
        self.touch_conversation(&conversation.id)?;
        Ok((message, true))
    }

    /// Append a bot-authored reply (C8 dispatch, or the logic engine's
    /// scripted/LLM-generated text).
    pub fn append_bot(
        &self,
        bot_id: &str,
        line_user_id: &str,
        message_type: &str,
        content: &serde_json::Value,
    ) -> Result<Message> {
        let conversation = self.get_or_create(bot_id, line_user_id)?;
        let message = self.insert_message(
            &conversation.id,
            None,
            "message",
            message_type,
            content,
            SenderType::Bot,
            None,
        )?;
        self.touch_conversation(&conversation.id)?;
        Ok(message)
    }

    /// Append an admin-authored message sent from the operator dashboard.
    pub fn append_admin(
        &self,
        bot_id: &str,
        line_user_id: &str,
        message_type: &str,
        content: &serde_json::Value,
        admin: AdminIdentity,
    ) -> Result<Message> {
        let conversation = self.get_or_create(bot_id, line_user_id)?;
        let message = self.insert_message(
            &conversation.id,
            None,
            "message",
            message_type,
            content,
            SenderType::Admin,
            Some(admin),
        )?;
        self.touch_conversation(&conversation.id)?;
        Ok(message)
    }

    /// Set media_url/media_path on an existing message. No-op (returns
    /// `false`) if either field is already set — the media fetch worker
    /// never overwrites a completed fetch.
    #[instrument(skip(self))]
    pub fn patch_media(&self, message_id: &str, media_url: &str, media_path: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE messages SET media_url = ?2, media_path = ?3
             WHERE id = ?1 AND media_url IS NULL AND media_path IS NULL",
            params![message_id, media_url, media_path],
        )?;
        Ok(rows > 0)
    }

    /// Paginated read over a conversation's messages, newest first.
    pub fn read(
        &self,
        bot_id: &str,
        line_user_id: &str,
        limit: i64,
        offset: i64,
        filter: &SenderFilter,
    ) -> Result<(Vec<Message>, i64)> {
        let Some(conversation) = self.find(bot_id, line_user_id)? else {
            return Ok((Vec::new(), 0));
        };

        let db = self.db.lock().unwrap();
        let sender_clause = filter
            .sender_type
            .map(|_| " AND sender_type = ?4")
            .unwrap_or("");

        let sql = format!(
            "{MESSAGE_SELECT_SQL} WHERE conversation_id = ?1{sender_clause}
             ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = db.prepare(&sql)?;
        let items: Vec<Message> = if let Some(sender) = filter.sender_type {
            stmt.query_map(
                params![conversation.id, limit, offset, sender.to_string()],
                row_to_message,
            )?
            .filter_map(|r| r.ok())
            .collect()
        } else {
            stmt.query_map(params![conversation.id, limit, offset], row_to_message)?
                .filter_map(|r| r.ok())
                .collect()
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1{sender_clause}"
        );
        let total: i64 = if let Some(sender) = filter.sender_type {
            db.query_row(
                &count_sql,
                params![conversation.id, sender.to_string()],
                |r| r.get(0),
            )?
        } else {
            db.query_row(&count_sql, params![conversation.id], |r| r.get(0))?
        };

        Ok((items, total))
    }

    fn find_by_line_message_id(
        &self,
        bot_id: &str,
        line_message_id: &str,
    ) -> Result<Option<Message>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{MESSAGE_SELECT_SQL} WHERE bot_id = ?1 AND line_message_id = ?2");
        match db.query_row(&sql, params![bot_id, line_message_id], row_to_message) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ConversationError::Database(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_message(
        &self,
        conversation_id: &str,
        line_message_id: Option<String>,
        event_type: &str,
        message_type: &str,
        content: &serde_json::Value,
        sender_type: SenderType,
        admin: Option<AdminIdentity>,
    ) -> Result<Message> {
        // conversation_id alone doesn't carry bot_id/line_user_id, so look
        // them up once here for the dedup index and the filtered reads.
        let (bot_id, line_user_id) = self.conversation_scope(conversation_id)?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let content_str = serde_json::to_string(content).map_err(|e| {
            ConversationError::InvalidData(format!("content not serializable: {e}"))
        })?;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO messages (
                id, conversation_id, bot_id, line_user_id, line_message_id,
                event_type, message_type, content, sender_type,
                admin_id, admin_username, admin_full_name, timestamp,
                media_url, media_path
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,NULL,NULL)",
            params![
                id,
                conversation_id,
                bot_id,
                line_user_id,
                line_message_id,
                event_type,
                message_type,
                content_str,
                sender_type.to_string(),
                admin.as_ref().map(|a| a.id.as_str()),
                admin.as_ref().map(|a| a.username.as_str()),
                admin.as_ref().map(|a| a.full_name.as_str()),
                now,
            ],
        )?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            line_message_id,
            event_type: event_type.to_string(),
            message_type: message_type.to_string(),
            content: content.clone(),
            sender_type,
            admin_user: admin,
            timestamp: now,
            media_url: None,
            media_path: None,
        })
    }

    fn conversation_scope(&self, conversation_id: &str) -> Result<(String, String)> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT bot_id, line_user_id FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(ConversationError::from)
    }

    fn touch_conversation(&self, conversation_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        ConversationStore::new(Arc::new(Mutex::new(conn)))
    }

    fn event(line_message_id: Option<&str>, text: &str) -> InboundEvent {
        InboundEvent {
            line_message_id: line_message_id.map(String::from),
            event_type: "message".to_string(),
            message_type: "text".to_string(),
            content: serde_json::json!({ "text": text }),
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = store();
        let a = store.get_or_create("bot-1", "user-1").unwrap();
        let b = store.get_or_create("bot-1", "user-1").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn append_user_dedups_on_line_message_id() {
        let store = store();
        let (first, is_new1) = store
            .append_user("bot-1", "user-1", event(Some("line-msg-1"), "hi"))
            .unwrap();
        assert!(is_new1);

        let (second, is_new2) = store
            .append_user("bot-1", "user-1", event(Some("line-msg-1"), "hi again"))
            .unwrap();
        assert!(!is_new2);
        assert_eq!(first.id, second.id);
        assert_eq!(second.text_content(), Some("hi"));
    }

    #[test]
    fn append_user_without_line_message_id_never_dedups() {
        let store = store();
        let (a, _) = store
            .append_user("bot-1", "user-1", event(None, "one"))
            .unwrap();
        let (b, is_new) = store
            .append_user("bot-1", "user-1", event(None, "two"))
            .unwrap();
        assert!(is_new);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn patch_media_is_idempotent() {
        let store = store();
        let (msg, _) = store
            .append_user("bot-1", "user-1", event(Some("line-img-1"), ""))
            .unwrap();

        assert!(store.patch_media(&msg.id, "https://cdn/x.jpg", "bot-1/img/x.jpg").unwrap());
        assert!(!store.patch_media(&msg.id, "https://cdn/y.jpg", "bot-1/img/y.jpg").unwrap());

        let (items, _) = store
            .read("bot-1", "user-1", 10, 0, &SenderFilter::default())
            .unwrap();
        let patched = items.iter().find(|m| m.id == msg.id).unwrap();
        assert_eq!(patched.media_url.as_deref(), Some("https://cdn/x.jpg"));
    }

    #[test]
    fn read_orders_newest_first_and_filters_by_sender() {
        let store = store();
        store.append_user("bot-1", "user-1", event(Some("l1"), "hello")).unwrap();
        store
            .append_bot("bot-1", "user-1", "text", &serde_json::json!({ "text": "hi there" }))
            .unwrap();

        let (all, total) = store
            .read("bot-1", "user-1", 10, 0, &SenderFilter::default())
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(all[0].sender_type, SenderType::Bot);

        let (bot_only, bot_total) = store
            .read(
                "bot-1",
                "user-1",
                10,
                0,
                &SenderFilter { sender_type: Some(SenderType::Bot) },
            )
            .unwrap();
        assert_eq!(bot_total, 1);
        assert_eq!(bot_only.len(), 1);
    }
}
