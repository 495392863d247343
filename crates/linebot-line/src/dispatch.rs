use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, warn};

use linebot_conversations::{ConversationStore, Message};

use crate::client::LineClient;
use crate::error::Result;

/// LINE rejects more than 5 messages in one reply/push call.
const LINE_MAX_MESSAGES_PER_CALL: usize = 5;

/// C9 hook: every successfully dispatched bot message is announced here
/// so the WebSocket fabric can fan it out to dashboard subscribers
/// without the line crate knowing anything about WebSockets.
#[async_trait]
pub trait DispatchNotifier: Send + Sync {
    async fn notify_bot_message(&self, bot_id: &str, line_user_id: &str, message: &Message);
}

pub struct NoopNotifier;

#[async_trait]
impl DispatchNotifier for NoopNotifier {
    async fn notify_bot_message(&self, _bot_id: &str, _line_user_id: &str, _message: &Message) {}
}

/// §4.8 C8: one dispatcher per webhook invocation. The first send
/// attempts reply mode with the event's one-shot `reply_token`; every
/// send after that (and any send if there was no reply token, e.g. a
/// logic-engine timer or an admin broadcast) uses push mode.
pub struct ReplyDispatcher<'a> {
    client: &'a LineClient,
    conversations: &'a ConversationStore,
    notifier: &'a dyn DispatchNotifier,
    bot_id: String,
    line_user_id: String,
    reply_token: Option<String>,
    reply_spent: bool,
}

impl<'a> ReplyDispatcher<'a> {
    pub fn new(
        client: &'a LineClient,
        conversations: &'a ConversationStore,
        notifier: &'a dyn DispatchNotifier,
        bot_id: impl Into<String>,
        line_user_id: impl Into<String>,
        reply_token: Option<String>,
    ) -> Self {
        Self {
            client,
            conversations,
            notifier,
            bot_id: bot_id.into(),
            line_user_id: line_user_id.into(),
            reply_token,
            reply_spent: false,
        }
    }

    /// Send a batch of (message_type, LINE-wire message object) pairs.
    /// Chunks to LINE's 5-per-call limit, records each sent message via
    /// `ConversationStore::append_bot`, and notifies the dispatch hook.
    #[instrument(skip(self, messages), fields(bot_id = %self.bot_id, line_user_id = %self.line_user_id))]
    pub async fn send(&mut self, messages: &[(String, Value)]) -> Result<()> {
        for chunk in messages.chunks(LINE_MAX_MESSAGES_PER_CALL) {
            let payload: Vec<Value> = chunk.iter().map(|(_, v)| v.clone()).collect();
            self.send_chunk(&payload).await?;

            for (message_type, content) in chunk {
                let message = self.conversations.append_bot(
                    &self.bot_id,
                    &self.line_user_id,
                    message_type,
                    content,
                )?;
                self.notifier
                    .notify_bot_message(&self.bot_id, &self.line_user_id, &message)
                    .await;
            }
        }
        Ok(())
    }

    async fn send_chunk(&mut self, payload: &[Value]) -> Result<()> {
        if !self.reply_spent {
            if let Some(token) = self.reply_token.clone() {
                self.reply_spent = true;
                if let Err(e) = self.client.reply(&token, payload).await {
                    warn!(error = %e, "reply-mode send failed, falling back to push");
                    return self.client.push(&self.line_user_id, payload).await;
                }
                return Ok(());
            }
            self.reply_spent = true;
        }
        self.client.push(&self.line_user_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_line_limit() {
        let messages: Vec<(String, Value)> = (0..12)
            .map(|i| ("text".to_string(), serde_json::json!({ "type": "text", "text": i })))
            .collect();
        let chunks: Vec<_> = messages.chunks(LINE_MAX_MESSAGES_PER_CALL).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 5);
        assert_eq!(chunks[2].len(), 2);
    }
}
