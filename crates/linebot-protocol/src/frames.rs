use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator for server→client WS envelopes (§6 WebSocket Envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Connected,
    Subscribed,
    ChatMessage,
    NewUserMessage,
    ActivityUpdate,
    AnalyticsUpdate,
    WebhookStatusUpdate,
    InitialData,
    Pong,
    Error,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Connected => "connected",
            EnvelopeKind::Subscribed => "subscribed",
            EnvelopeKind::ChatMessage => "chat_message",
            EnvelopeKind::NewUserMessage => "new_user_message",
            EnvelopeKind::ActivityUpdate => "activity_update",
            EnvelopeKind::AnalyticsUpdate => "analytics_update",
            EnvelopeKind::WebhookStatusUpdate => "webhook_status_update",
            EnvelopeKind::InitialData => "initial_data",
            EnvelopeKind::Pong => "pong",
            EnvelopeKind::Error => "error",
        }
    }
}

/// Every server→client frame, whether delivered to a locally registered
/// socket or relayed through Redis first. Wire shape per §6:
/// `{ "type": "<kind>", "bot_id": "...", "line_user_id": "...?", "data": {...}, "timestamp": "..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub bot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_user_id: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// Present only on frames that crossed the Redis bridge; names the
    /// originating process so it can skip re-delivering to its own sockets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EnvelopeMeta>,
}

impl WsEnvelope {
    pub fn new(kind: EnvelopeKind, bot_id: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            kind,
            bot_id: bot_id.into(),
            line_user_id: None,
            data: serde_json::to_value(data).unwrap_or(Value::Null),
            timestamp: Utc::now(),
            meta: None,
        }
    }

    pub fn with_line_user(mut self, line_user_id: impl Into<String>) -> Self {
        self.line_user_id = Some(line_user_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.meta = Some(EnvelopeMeta {
            source: source.into(),
        });
        self
    }

    /// True when this envelope originated from `node_id` itself — used by
    /// the Redis subscriber to avoid re-delivering to the sockets that
    /// already saw it locally before publish.
    pub fn originated_from(&self, node_id: &str) -> bool {
        self.meta.as_ref().is_some_and(|m| m.source == node_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub source: String,
}

/// Client→server control frame. Unknown `type` values are accepted at the
/// parse layer and turned into an `error` envelope by the dispatcher —
/// the socket itself stays open (§4.9).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Ping {
        #[serde(default)]
        ts: Option<Value>,
    },
    SubscribeAnalytics,
    SubscribeActivities,
    SubscribeWebhookStatus,
    GetInitialData,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}
