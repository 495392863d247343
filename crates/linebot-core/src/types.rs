use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a bot (tenant). UUIDv7 — time-sortable for easier
/// log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotId(pub String);

impl BotId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BotId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// LINE's opaque per-platform user identifier (the `userId` field on
/// webhook `source` objects). Stable for a given bot, not guaranteed
/// stable across bots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineUserId(pub String);

impl LineUserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LineUserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LineUserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// LINE's message/event identifier, used as the dedup key for C2.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineMessageId(pub String);

impl LineMessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LineMessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LineMessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Conversation-scoped, time-sortable message identifier minted by C2 on
/// persist (distinct from `LineMessageId`, which is the upstream dedup key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a persisted conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Bot,
    Admin,
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderType::User => write!(f, "user"),
            SenderType::Bot => write!(f, "bot"),
            SenderType::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderType::User),
            "bot" => Ok(SenderType::Bot),
            "admin" => Ok(SenderType::Admin),
            other => Err(format!("unknown sender_type: {}", other)),
        }
    }
}

/// LINE webhook event discriminator. Kept open with `Other` because LINE
/// periodically ships new event types that should still be logged and
/// persisted rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Follow,
    Unfollow,
    Postback,
    Other(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Message => write!(f, "message"),
            EventType::Follow => write!(f, "follow"),
            EventType::Unfollow => write!(f, "unfollow"),
            EventType::Postback => write!(f, "postback"),
            EventType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "message" => EventType::Message,
            "follow" => EventType::Follow,
            "unfollow" => EventType::Unfollow,
            "postback" => EventType::Postback,
            other => EventType::Other(other.to_string()),
        })
    }
}

/// Content-kind discriminator for a message event, independent of the
/// event type that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Sticker,
    Flex,
    Location,
    Other(String),
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Image => write!(f, "image"),
            MessageType::Video => write!(f, "video"),
            MessageType::Audio => write!(f, "audio"),
            MessageType::Sticker => write!(f, "sticker"),
            MessageType::Flex => write!(f, "flex"),
            MessageType::Location => write!(f, "location"),
            MessageType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "text" => MessageType::Text,
            "image" => MessageType::Image,
            "video" => MessageType::Video,
            "audio" => MessageType::Audio,
            "sticker" => MessageType::Sticker,
            "flex" => MessageType::Flex,
            "location" => MessageType::Location,
            other => MessageType::Other(other.to_string()),
        })
    }
}

impl MessageType {
    /// Media kinds C3 is responsible for fetching from LINE's content API
    /// and proxying into object storage.
    pub fn is_fetchable_media(&self) -> bool {
        matches!(
            self,
            MessageType::Image | MessageType::Video | MessageType::Audio
        )
    }
}

/// Identity of an operator-dashboard admin who sent a message through a
/// conversation (as opposed to the bot or the LINE user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

/// Builds the object-store key for a fetched media asset:
/// `{bot_id|"global"}/{img|video|audio}/{uuid}.{ext}`.
pub fn media_object_path(bot_id: Option<&BotId>, kind: &str, ext: &str) -> String {
    let scope = bot_id
        .map(|b| b.as_str().to_string())
        .unwrap_or_else(|| "global".to_string());
    format!("{}/{}/{}.{}", scope, kind, Uuid::new_v4(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_object_path_uses_global_when_bot_absent() {
        let path = media_object_path(None, "img", "jpg");
        assert!(path.starts_with("global/img/"));
        assert!(path.ends_with(".jpg"));
    }

    #[test]
    fn media_object_path_scopes_to_bot() {
        let bot = BotId::from("bot-1");
        let path = media_object_path(Some(&bot), "video", "mp4");
        assert!(path.starts_with("bot-1/video/"));
    }

    #[test]
    fn message_type_parses_known_and_falls_back_to_other() {
        assert_eq!("text".parse::<MessageType>().unwrap(), MessageType::Text);
        assert_eq!(
            "unknown".parse::<MessageType>().unwrap(),
            MessageType::Other("unknown".to_string())
        );
    }

    #[test]
    fn sender_type_round_trips() {
        for s in ["user", "bot", "admin"] {
            assert_eq!(s.parse::<SenderType>().unwrap().to_string(), s);
        }
        assert!("nope".parse::<SenderType>().is_err());
    }
}
