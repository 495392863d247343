use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{LlmError, Result};
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, Role};

/// OpenAI-compatible chat-completions provider. Also fronts any
/// OpenAI-wire-compatible endpoint (Groq, local vLLM, etc.) by pointing
/// `base_url` elsewhere — the original source's `groq_service.py` is the
/// same shape with a different host.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
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
struct OaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaMessage>,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct OaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OaChatResponse {
    choices: Vec<OaChoice>,
}

#[derive(Deserialize)]
struct OaChoice {
    message: OaMessage,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let messages = req
            .messages
            .iter()
            .map(|m| OaMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        let body = OaChatRequest {
            model: &req.model,
            messages,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
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
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(LlmError::RateLimited { retry_after_ms });
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

        let parsed: OaChatResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "failed to parse OpenAI-compatible response");
            LlmError::Parse(e.to_string())
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(ChatResponse { text })
    }

    fn max_tokens_for_model(&self, model: &str) -> u32 {
        crate::prompt::known_model_max_tokens(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping_matches_openai_wire_names() {
        let req = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                crate::provider::ChatMessage::system("base"),
                crate::provider::ChatMessage::user("hi"),
            ],
            max_tokens: 2048,
        };
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
    }
}
