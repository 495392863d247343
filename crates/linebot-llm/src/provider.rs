use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single role-tagged block sent to the provider. §4.6 requires the
/// system/history/context/question boundary to stay textual rather than
/// abusing provider-specific roles, so every provider implementation just
/// renders these in order — no provider gets more than `system` + `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request to an LLM provider (C6's `ask` contract, post prompt-assembly).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
}

/// Common interface for chat-completion backends. Bots select a provider
/// by name via `Bot::ai_provider`; unknown names fall back to the
/// configured default (see `LlmClient::provider_for`).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Maximum output tokens the given model supports, used to derive the
    /// 80%-floor-2048-cap-at-max default from §4.6.
    fn max_tokens_for_model(&self, model: &str) -> u32;
}
