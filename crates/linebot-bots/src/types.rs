use serde::{Deserialize, Serialize};

/// Tenant-owned messaging endpoint (§3 Bot).
///
/// `channel_token`/`channel_secret` are opaque bearer material handed to us
/// by the tenant; this crate never validates their shape, only stores and
/// rotates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    /// UUIDv7 — time-sortable, useful for log correlation.
    pub id: String,
    pub owner_id: String,
    pub channel_token: Option<String>,
    pub channel_secret: Option<String>,

    pub ai_takeover_enabled: bool,
    pub ai_provider: Option<String>,
    pub ai_model: Option<String>,
    pub ai_system_prompt: Option<String>,
    /// Similarity floor in [0, 1] applied at retrieval (§4.5 S5).
    pub ai_rag_threshold: f32,
    pub ai_rag_top_k: u32,
    pub ai_history_messages: u32,
    /// Retrieval mode for this bot's RAG pipeline: `"vector_only"`,
    /// `"hybrid_rrf"`, or `"rerank"` (§4.5 mode selection is per-bot, not
    /// platform-wide, so it lives here alongside the other RAG knobs).
    pub ai_retrieval_mode: String,

    pub created_at: String,
    pub updated_at: String,
}

impl Bot {
    /// A bot is usable by the event-reaction pipeline only once both
    /// credentials are present — otherwise C10 rejects inbound webhooks
    /// with `bot_misconfigured` before C1 ever runs.
    pub fn is_configured(&self) -> bool {
        self.channel_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.channel_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

fn default_rag_threshold() -> f32 {
    0.7
}

fn default_rag_top_k() -> u32 {
    5
}

fn default_retrieval_mode() -> String {
    "vector_only".to_string()
}

/// Fields accepted when creating a bot; the rest are system-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBot {
    pub owner_id: String,
    #[serde(default)]
    pub channel_token: Option<String>,
    #[serde(default)]
    pub channel_secret: Option<String>,
    #[serde(default)]
    pub ai_takeover_enabled: bool,
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub ai_system_prompt: Option<String>,
    #[serde(default = "default_rag_threshold")]
    pub ai_rag_threshold: f32,
    #[serde(default = "default_rag_top_k")]
    pub ai_rag_top_k: u32,
    #[serde(default)]
    pub ai_history_messages: u32,
    #[serde(default = "default_retrieval_mode")]
    pub ai_retrieval_mode: String,
}
