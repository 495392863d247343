use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{LineError, Result};

const REPLY_URL: &str = "https://api.line.me/v2/bot/message/reply";
const PUSH_URL: &str = "https://api.line.me/v2/bot/message/push";
const CONTENT_URL_BASE: &str = "https://api-data.line.me/v2/bot/message";
const BOT_INFO_URL: &str = "https://api.line.me/v2/bot/info";

/// Outbound HTTP client to LINE's Messaging API (§6 "Outbound HTTP to
/// LINE"). One instance per bot — constructed with that bot's channel
/// token, never shared across tenants.
pub struct LineClient {
    http: reqwest::Client,
    channel_token: String,
}

#[derive(Serialize)]
struct ReplyBody<'a> {
    #[serde(rename = "replyToken")]
    reply_token: &'a str,
    messages: &'a [Value],
}

#[derive(Serialize)]
struct PushBody<'a> {
    to: &'a str,
    messages: &'a [Value],
}

impl LineClient {
    pub fn new(channel_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            channel_token: channel_token.into(),
        }
    }

    /// Reply-mode send — consumes the one-shot `reply_token` from the
    /// inbound event. LINE allows up to 5 messages per call; callers
    /// (C8) are expected to chunk accordingly.
    pub async fn reply(&self, reply_token: &str, messages: &[Value]) -> Result<()> {
        let resp = self
            .http
            .post(REPLY_URL)
            .bearer_auth(&self.channel_token)
            .json(&ReplyBody {
                reply_token,
                messages,
            })
            .send()
            .await
            .map_err(|e| LineError::SendFailed(e.to_string()))?;
        Self::check(resp).await
    }

    /// Push-mode send — always available, used for every message after
    /// the first reply-mode send within one webhook invocation (§4.8).
    pub async fn push(&self, to: &str, messages: &[Value]) -> Result<()> {
        let resp = self
            .http
            .post(PUSH_URL)
            .bearer_auth(&self.channel_token)
            .json(&PushBody { to, messages })
            .send()
            .await
            .map_err(|e| LineError::SendFailed(e.to_string()))?;
        Self::check(resp).await
    }

    /// Fetch a media message's binary content (§4.3 C3, §6 content API).
    pub async fn fetch_content(&self, line_message_id: &str) -> Result<(Vec<u8>, Option<String>)> {
        let resp = self
            .http
            .get(format!("{CONTENT_URL_BASE}/{line_message_id}/content"))
            .bearer_auth(&self.channel_token)
            .send()
            .await
            .map_err(|e| LineError::MediaFetchFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LineError::MediaFetchFailed(format!(
                "content fetch returned {}",
                resp.status()
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| LineError::MediaFetchFailed(e.to_string()))?;

        Ok((bytes.to_vec(), content_type))
    }

    /// §6 status endpoint's `line_api_accessible` probe: confirms the
    /// channel token is still accepted by LINE, without sending anything
    /// to an end user.
    pub async fn bot_info_accessible(&self) -> bool {
        self.http
            .get(BOT_INFO_URL)
            .bearer_auth(&self.channel_token)
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }

    async fn check(resp: reqwest::Response) -> Result<()> {
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "LINE API call failed");
        Err(LineError::SendFailed(format!("{status}: {body}")))
    }
}
