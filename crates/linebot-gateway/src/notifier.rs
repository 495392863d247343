//! Bridges C8 (`linebot_line::DispatchNotifier`) to C9 (the WS fabric)
//! without `linebot-line` knowing anything about WebSockets (§9 design
//! note on decorator/dynamic-dispatch replacements — here the boundary is
//! a plain trait object instead).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use linebot_conversations::Message;
use linebot_line::DispatchNotifier;
use linebot_protocol::frames::EnvelopeKind;

use crate::ws::Broadcaster;

pub struct GatewayNotifier {
    pub broadcaster: Arc<Broadcaster>,
}

#[async_trait]
impl DispatchNotifier for GatewayNotifier {
    async fn notify_bot_message(&self, bot_id: &str, line_user_id: &str, message: &Message) {
        let data = json!({
            "message_id": message.id,
            "message_type": message.message_type,
            "content": message.content,
            "media_url": message.media_url,
            "timestamp": message.timestamp,
        });
        self.broadcaster
            .broadcast(EnvelopeKind::ChatMessage, bot_id, Some(line_user_id), data)
            .await;
    }
}
