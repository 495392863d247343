use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{LlmError, Result};
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, Role};

/// Anthropic Messages API provider. System content is sent via the
/// dedicated `system` field rather than as a message — the only
/// provider-specific divergence from the OpenAI shape, and it still keeps
/// the §4.6 textual-boundary rule (no tool/role abuse to fake a system turn).
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let system = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => unreachable!("filtered above"),
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        let body = AnthropicRequest {
            model: &req.model,
            system: &system,
            messages,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { ms: 0 }
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                retry_after_ms: None,
            });
        }
        if status.is_server_error() {
            return Err(LlmError::ServerError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::ClientError {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: AnthropicResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "failed to parse Anthropic response");
            LlmError::Parse(e.to_string())
        })?;

        let text = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse { text })
    }

    fn max_tokens_for_model(&self, model: &str) -> u32 {
        crate::prompt::known_model_max_tokens(model)
    }
}
