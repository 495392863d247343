use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{LlmError, Result};
use crate::provider::{ChatMessage, ChatRequest, LlmProvider};
use crate::retry;

/// Process-wide LLM client holder (§5, §9: "global client singletons ...
/// process-wide lazily-initialized holders with explicit init/shutdown").
/// Owns the provider registry, the single process-wide circuit breaker,
/// and the retry policy; component crates only ever see this, never a
/// raw `reqwest::Client`.
pub struct LlmClient {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: String,
    breaker: CircuitBreaker,
    max_attempts: u32,
    retry_base_ms: u64,
}

/// One turn's worth of assembled input to C6, already shaped per §4.6:
/// system, optional history block, optional context block, question.
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub context_text: Option<&'a str>,
    pub history: &'a [ChatMessage],
    pub model: &'a str,
    pub system_prompt: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub max_tokens: Option<u32>,
}

impl LlmClient {
    pub fn new(
        providers: HashMap<String, Arc<dyn LlmProvider>>,
        default_provider: impl Into<String>,
        circuit_breaker_threshold: u32,
        circuit_breaker_cooldown_secs: u64,
        max_attempts: u32,
        retry_base_ms: u64,
    ) -> Self {
        Self {
            providers,
            default_provider: default_provider.into(),
            breaker: CircuitBreaker::new(circuit_breaker_threshold, circuit_breaker_cooldown_secs),
            max_attempts,
            retry_base_ms,
        }
    }

    fn provider_for(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let key = name.unwrap_or(&self.default_provider);
        self.providers
            .get(key)
            .cloned()
            .ok_or_else(|| LlmError::UnknownProvider(key.to_string()))
    }

    /// §4.6 `ask` contract. Assembles the four-block message list
    /// (system, history, context, question) and runs it through retry +
    /// circuit breaker. A per-attempt hard timeout of 30s is enforced by
    /// the provider's own HTTP client timeout; this wrapper only handles
    /// retry count and backoff.
    pub async fn ask(&self, req: AskRequest<'_>) -> Result<String> {
        if self.breaker.is_open() {
            return Err(LlmError::CircuitOpen);
        }

        let provider = self.provider_for(req.provider)?;
        let model_max = provider.max_tokens_for_model(req.model);
        let max_tokens = crate::prompt::resolve_max_tokens(req.max_tokens, model_max);

        let mut messages = vec![ChatMessage::system(crate::prompt::system_prompt(
            req.system_prompt,
        ))];
        if !req.history.is_empty() {
            let transcript: String = req
                .history
                .iter()
                .map(|m| {
                    let who = match m.role {
                        crate::provider::Role::Assistant => "assistant",
                        _ => "user",
                    };
                    format!("{who}: {}", m.content)
                })
                .collect::<Vec<_>>()
                .join("\n");
            messages.push(ChatMessage::user(format!(
                "以下是先前的對話紀錄：\n{transcript}"
            )));
        }
        if let Some(context) = req.context_text {
            if !context.trim().is_empty() {
                messages.push(ChatMessage::user(format!(
                    "以下是檢索到的知識庫片段：\n{context}"
                )));
            }
        }
        messages.push(ChatMessage::user(req.question));

        let chat_req = ChatRequest {
            model: req.model.to_string(),
            messages,
            max_tokens,
        };

        let result = retry::with_retry(self.max_attempts, self.retry_base_ms, || {
            provider.chat(&chat_req)
        })
        .await;

        match &result {
            Ok(_) => {
                self.breaker.record_success();
                info!(provider = provider.name(), model = req.model, "LLM call succeeded");
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(provider = provider.name(), error = %e, "LLM call failed");
            }
        }

        result.map(|r| r.text)
    }

    /// §5/§4.6: classifier calls run under a hard 8s ceiling; a timeout or
    /// any error degrades to the caller's fallback rather than propagating.
    pub async fn ask_with_timeout(&self, req: AskRequest<'_>, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.ask(req)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }
}
