use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LlmError, Result};

/// Client for the external embedding provider (§1 Non-goals: this system
/// is a *client*, never a host, of the embedding model). OpenAI-wire
/// compatible — same shape the teacher's chat providers use.
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        }
    }

    /// Embed `text`, returning a vector of the configured dimensionality.
    /// NaN/Inf components are the knowledge store's problem to sanitize
    /// (`linebot_knowledge::types::sanitize_embedding`); this client only
    /// guards against the provider returning the wrong length outright.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(format!(
                "{}/v1/embeddings",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { ms: 30_000 }
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::ClientError {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: EmbedResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "failed to parse embeddings response");
            LlmError::Parse(e.to_string())
        })?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .unwrap_or_default();

        if vector.len() != self.dimensions {
            warn!(
                expected = self.dimensions,
                got = vector.len(),
                "embedding provider returned unexpected dimensionality"
            );
        }

        Ok(vector)
    }
}
