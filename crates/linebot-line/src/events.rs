use serde::Deserialize;
use serde_json::Value;

use crate::error::{LineError, Result};

/// Raw webhook body shape, as delivered by LINE.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "replyToken")]
    pub reply_token: Option<String>,
    pub source: Option<RawSource>,
    pub message: Option<RawMessage>,
    pub postback: Option<RawPostback>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPostback {
    pub data: String,
}

/// Decoded, typed event — the boundary past which the rest of the
/// pipeline (C2, C7, C10) operates on totals functions over variants
/// instead of re-inspecting a JSON blob (§9 "dynamic dispatch on dict
/// shapes" replacement).
#[derive(Debug, Clone)]
pub enum LineEvent {
    Message {
        user_id: String,
        reply_token: Option<String>,
        line_message_id: String,
        message_type: String,
        text: Option<String>,
        raw: Value,
    },
    Follow {
        user_id: String,
        reply_token: Option<String>,
    },
    Unfollow {
        user_id: String,
    },
    Postback {
        user_id: String,
        reply_token: Option<String>,
        data: String,
    },
    Other {
        event_type: String,
        user_id: Option<String>,
    },
}

impl LineEvent {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            LineEvent::Message { user_id, .. }
            | LineEvent::Follow { user_id, .. }
            | LineEvent::Unfollow { user_id }
            | LineEvent::Postback { user_id, .. } => Some(user_id),
            LineEvent::Other { user_id, .. } => user_id.as_deref(),
        }
    }

    pub fn reply_token(&self) -> Option<&str> {
        match self {
            LineEvent::Message { reply_token, .. }
            | LineEvent::Follow { reply_token, .. }
            | LineEvent::Postback { reply_token, .. } => reply_token.as_deref(),
            _ => None,
        }
    }

    pub fn event_type_str(&self) -> &str {
        match self {
            LineEvent::Message { .. } => "message",
            LineEvent::Follow { .. } => "follow",
            LineEvent::Unfollow { .. } => "unfollow",
            LineEvent::Postback { .. } => "postback",
            LineEvent::Other { event_type, .. } => event_type,
        }
    }
}

/// Parse a raw webhook body into a typed event list. A malformed body
/// (invalid JSON) is the only thing that maps to `malformed_body`;
/// individual events we don't recognize become `LineEvent::Other` rather
/// than failing the whole batch, because §4.10 processes events
/// independently and must not let one bad event drop its siblings.
pub fn parse_webhook_body(body: &[u8]) -> Result<Vec<LineEvent>> {
    let parsed: WebhookBody =
        serde_json::from_slice(body).map_err(|e| LineError::MalformedBody(e.to_string()))?;

    Ok(parsed.events.into_iter().map(decode_event).collect())
}

fn decode_event(raw: RawEvent) -> LineEvent {
    let user_id = raw
        .source
        .as_ref()
        .and_then(|s| s.user_id.clone())
        .unwrap_or_default();

    match raw.kind.as_str() {
        "message" => {
            if let Some(msg) = raw.message {
                let raw_json = serde_json::json!({ "text": msg.text });
                LineEvent::Message {
                    user_id,
                    reply_token: raw.reply_token,
                    line_message_id: msg.id,
                    message_type: msg.kind,
                    text: msg.text,
                    raw: raw_json,
                }
            } else {
                LineEvent::Other {
                    event_type: "message".to_string(),
                    user_id: Some(user_id),
                }
            }
        }
        "follow" => LineEvent::Follow {
            user_id,
            reply_token: raw.reply_token,
        },
        "unfollow" => LineEvent::Unfollow { user_id },
        "postback" => LineEvent::Postback {
            user_id,
            reply_token: raw.reply_token,
            data: raw.postback.map(|p| p.data).unwrap_or_default(),
        },
        other => LineEvent::Other {
            event_type: other.to_string(),
            user_id: Some(user_id),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_events_array_parses_fine() {
        let events = parse_webhook_body(br#"{"events":[]}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn invalid_json_is_malformed_body() {
        let err = parse_webhook_body(b"not json").unwrap_err();
        assert_eq!(err.code(), "malformed_body");
    }

    #[test]
    fn text_message_decodes_with_message_id() {
        let body = br#"{"events":[{"type":"message","replyToken":"rt1","source":{"type":"user","userId":"U1"},"message":{"id":"m-1","type":"text","text":"hi"},"timestamp":1}]}"#;
        let events = parse_webhook_body(body).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            LineEvent::Message {
                line_message_id,
                text,
                user_id,
                ..
            } => {
                assert_eq!(line_message_id, "m-1");
                assert_eq!(text.as_deref(), Some("hi"));
                assert_eq!(user_id, "U1");
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn follow_event_decodes() {
        let body = br#"{"events":[{"type":"follow","replyToken":"rt2","source":{"type":"user","userId":"U2"}}]}"#;
        let events = parse_webhook_body(body).unwrap();
        assert!(matches!(events[0], LineEvent::Follow { .. }));
    }

    #[test]
    fn unknown_event_type_becomes_other_without_failing_the_batch() {
        let body = br#"{"events":[{"type":"beacon","source":{"type":"user","userId":"U3"}},{"type":"follow","source":{"type":"user","userId":"U4"}}]}"#;
        let events = parse_webhook_body(body).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LineEvent::Other { .. }));
        assert!(matches!(events[1], LineEvent::Follow { .. }));
    }
}
