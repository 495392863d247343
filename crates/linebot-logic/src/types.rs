use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ id, blockType, blockData, parentId?, connectedTo? }` — the
/// block-editor's wire shape for one node of a reaction graph (§3
/// "LogicTemplate").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "blockType")]
    pub block_type: BlockType,
    #[serde(rename = "blockData", default)]
    pub block_data: Value,
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<String>,
    #[serde(rename = "connectedTo", default)]
    pub connected_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    Event,
    Reply,
    FlexContent,
    FlexLayout,
}

/// A user-authored reaction graph for one bot (§3 "LogicTemplate").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogicTemplate {
    pub id: String,
    pub bot_id: String,
    pub name: String,
    pub is_active: bool,
    pub logic_blocks: Vec<Block>,
    pub updated_at: String,
}

/// Parsed `blockData` for an `event` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBlockData {
    pub event_type: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    #[serde(default)]
    pub data: Option<String>,
}

impl EventBlockData {
    /// `condition` and `pattern` are treated as aliases for the same
    /// matching input; whichever is non-empty wins.
    pub fn effective_condition(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.pattern.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Parsed `blockData` for a `reply` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBlockData {
    pub reply_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub flex_message_id: Option<String>,
    #[serde(default)]
    pub flex_content: Option<Value>,
    #[serde(default)]
    pub original_content_url: Option<String>,
    #[serde(default)]
    pub preview_image_url: Option<String>,
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub sticker_id: Option<String>,
}

/// The incoming event, reduced to what C7 needs to know — decoupled from
/// `linebot-line`'s wire types so the engine stays a pure function over
/// data its caller assembles.
#[derive(Debug, Clone)]
pub enum LogicEvent {
    Message { message_type: String, text: Option<String> },
    Postback { data: String },
    Follow,
    Unfollow,
}

impl LogicEvent {
    pub(crate) fn event_type_for_matching(&self) -> &'static str {
        match self {
            LogicEvent::Message { .. } => "message",
            LogicEvent::Postback { .. } => "postback",
            LogicEvent::Follow => "follow",
            LogicEvent::Unfollow => "unfollow",
        }
    }
}

/// One message C7 decided to emit, ready for C8 to send and for C2 to
/// record.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message_type: String,
    pub line_payload: Value,
    pub media_url: Option<String>,
}

/// Outcome of evaluating one bot's templates against one event.
#[derive(Debug, Clone, Default)]
pub struct EvalOutcome {
    pub messages: Vec<OutboundMessage>,
    /// True when a template matched but deferred to RAG per the
    /// AI-takeover override rule (§4.7 rule 6) — distinct from "no
    /// template matched at all," both of which leave `messages` empty.
    pub deferred_to_ai: bool,
}

/// Lookup for flex messages referenced by id (§3 "FlexMessage" — owned
/// by the bot's owner, not by the template). Injected so this crate
/// doesn't own a storage layer of its own.
pub trait FlexMessageLookup {
    fn get(&self, owner_id: &str, flex_message_id: &str) -> Option<Value>;
}

pub struct NoFlexMessages;

impl FlexMessageLookup for NoFlexMessages {
    fn get(&self, _owner_id: &str, _flex_message_id: &str) -> Option<Value> {
        None
    }
}
