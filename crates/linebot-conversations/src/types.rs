use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation — unique by (bot_id, line_user_id). Created lazily on
/// first inbound event; never deleted except by explicit operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// UUIDv7 primary key — time-sortable.
    pub id: String,
    pub bot_id: String,
    pub line_user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Bot,
    Admin,
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderType::User => write!(f, "user"),
            SenderType::Bot => write!(f, "bot"),
            SenderType::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for SenderType {
    type Err = crate::error::ConversationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderType::User),
            "bot" => Ok(SenderType::Bot),
            "admin" => Ok(SenderType::Admin),
            other => Err(crate::error::ConversationError::InvalidData(format!(
                "unknown sender_type: {other}"
            ))),
        }
    }
}

/// Identity of an operator-dashboard admin who sent a message directly
/// into a conversation. Required whenever `sender_type = admin` (§3
/// Message invariant ii).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

/// One append inside a conversation (§3 Message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned, stable primary key (UUIDv7).
    pub id: String,
    pub conversation_id: String,
    /// LINE's identifier; unique within a bot when present. None for
    /// bot/admin-authored messages, which never originate from LINE.
    pub line_message_id: Option<String>,
    /// e.g. "message", "follow", "unfollow", "postback".
    pub event_type: String,
    /// e.g. "text", "image", "video", "audio", "sticker", "flex", "location".
    pub message_type: String,
    /// Structured payload; text content lives under a `text` key.
    pub content: Value,
    pub sender_type: SenderType,
    pub admin_user: Option<AdminIdentity>,
    pub timestamp: String,
    pub media_url: Option<String>,
    pub media_path: Option<String>,
}

impl Message {
    pub fn text_content(&self) -> Option<&str> {
        self.content.get("text")?.as_str()
    }

    /// Invariant (iii): media fields are set atomically, never one without
    /// the other.
    pub fn media_is_consistent(&self) -> bool {
        self.media_url.is_some() == self.media_path.is_some()
    }
}

/// A fresh inbound event, not yet persisted. Built by the orchestrator
/// from a parsed LINE webhook event.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub line_message_id: Option<String>,
    pub event_type: String,
    pub message_type: String,
    pub content: Value,
}

/// Filter applied to `read()` (§4.2, §6 dashboard reads).
#[derive(Debug, Clone, Default)]
pub struct SenderFilter {
    pub sender_type: Option<SenderType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_consistency_holds_when_both_null() {
        let msg = sample_message(None, None);
        assert!(msg.media_is_consistent());
    }

    #[test]
    fn media_consistency_holds_when_both_set() {
        let msg = sample_message(Some("p".into()), Some("u".into()));
        assert!(msg.media_is_consistent());
    }

    #[test]
    fn media_consistency_breaks_when_mismatched() {
        let msg = sample_message(Some("p".into()), None);
        assert!(!msg.media_is_consistent());
    }

    fn sample_message(media_path: Option<String>, media_url: Option<String>) -> Message {
        Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            line_message_id: Some("line-1".into()),
            event_type: "message".into(),
            message_type: "image".into(),
            content: serde_json::json!({}),
            sender_type: SenderType::User,
            admin_user: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
            media_url,
            media_path,
        }
    }
}
