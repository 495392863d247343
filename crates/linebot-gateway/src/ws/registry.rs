//! Process-local connection registry (§4.9, §5 "the WebSocket registry is
//! process-local"). Cross-process fan-out is exclusively the Redis bridge's
//! job — this registry only knows about sockets open on this node.

use std::collections::HashSet;
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::mpsc;

use linebot_protocol::channels::SubscriptionChannel;

/// One locally registered socket. `channels` starts empty — a socket sees
/// nothing on `analytics_update`/`activity_update`/`webhook_status_update`
/// until it sends the matching `subscribe_*` control frame. `chat_message`
/// and `new_user_message` bypass this set entirely (see `deliver_local`):
/// every bot socket gets them unconditionally, the same way dashboard
/// sockets are registered pre-subscribed to every channel for the bots
/// they watch (§4.9 "user watching all their bots").
struct ConnHandle {
    tx: mpsc::Sender<String>,
    channels: Mutex<HashSet<SubscriptionChannel>>,
}

/// Registry keyed by bot id; each bot has its own map of live connections.
#[derive(Default)]
pub struct WsRegistry {
    by_bot: DashMap<String, DashMap<String, ConnHandle>>,
}

impl WsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly upgraded socket under `bot_id`. `all_channels`
    /// pre-subscribes (used for dashboard sockets, which skip the explicit
    /// `subscribe_*` handshake entirely).
    pub fn register(&self, bot_id: &str, conn_id: &str, tx: mpsc::Sender<String>, all_channels: bool) {
        let channels = if all_channels {
            [
                SubscriptionChannel::ChatMessage,
                SubscriptionChannel::NewUserMessage,
                SubscriptionChannel::ActivityUpdate,
                SubscriptionChannel::AnalyticsUpdate,
                SubscriptionChannel::WebhookStatusUpdate,
            ]
            .into_iter()
            .collect()
        } else {
            HashSet::new()
        };

        self.by_bot
            .entry(bot_id.to_string())
            .or_default()
            .insert(
                conn_id.to_string(),
                ConnHandle {
                    tx,
                    channels: Mutex::new(channels),
                },
            );
    }

    pub fn subscribe(&self, bot_id: &str, conn_id: &str, channel: SubscriptionChannel) {
        if let Some(conns) = self.by_bot.get(bot_id) {
            if let Some(conn) = conns.get(conn_id) {
                conn.channels.lock().unwrap().insert(channel);
            }
        }
    }

    pub fn unregister(&self, bot_id: &str, conn_id: &str) {
        if let Some(conns) = self.by_bot.get(bot_id) {
            conns.remove(conn_id);
        }
    }

    /// Deliver one already-serialized JSON payload to every locally
    /// registered socket subscribed to `channel` for `bot_id`. Silently
    /// drops sends to sockets whose receiver has gone away — the socket's
    /// own task will notice and unregister itself.
    ///
    /// `chat_message`/`new_user_message` bypass the subscription gate: the
    /// original `_send_to_bot_connections` fans those two out to every
    /// connected bot socket unconditionally (only analytics/activities/
    /// webhook_status are gated behind an explicit `subscribe_*` frame).
    pub fn deliver_local(&self, bot_id: &str, channel: SubscriptionChannel, payload: &str) {
        let Some(conns) = self.by_bot.get(bot_id) else {
            return;
        };
        let always_on = matches!(
            channel,
            SubscriptionChannel::ChatMessage | SubscriptionChannel::NewUserMessage
        );
        for entry in conns.iter() {
            let subscribed = always_on || entry.channels.lock().unwrap().contains(&channel);
            if subscribed {
                let _ = entry.tx.try_send(payload.to_string());
            }
        }
    }

    /// §9 supplemented feature: admin connection-count view.
    pub fn connection_count(&self, bot_id: &str) -> usize {
        self.by_bot.get(bot_id).map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chat_message_reaches_an_unsubscribed_bot_socket() {
        let registry = WsRegistry::new();
        let (tx, mut rx) = mpsc::channel::<String>(8);
        registry.register("bot-1", "conn-1", tx, false);

        registry.deliver_local("bot-1", SubscriptionChannel::ChatMessage, "hello");

        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn new_user_message_reaches_an_unsubscribed_bot_socket() {
        let registry = WsRegistry::new();
        let (tx, mut rx) = mpsc::channel::<String>(8);
        registry.register("bot-1", "conn-1", tx, false);

        registry.deliver_local("bot-1", SubscriptionChannel::NewUserMessage, "new-msg");

        assert_eq!(rx.recv().await.unwrap(), "new-msg");
    }

    #[tokio::test]
    async fn analytics_update_still_requires_explicit_subscription() {
        let registry = WsRegistry::new();
        let (tx, mut rx) = mpsc::channel::<String>(8);
        registry.register("bot-1", "conn-1", tx, false);

        registry.deliver_local("bot-1", SubscriptionChannel::AnalyticsUpdate, "stats");
        assert!(rx.try_recv().is_err());

        registry.subscribe("bot-1", "conn-1", SubscriptionChannel::AnalyticsUpdate);
        registry.deliver_local("bot-1", SubscriptionChannel::AnalyticsUpdate, "stats");
        assert_eq!(rx.recv().await.unwrap(), "stats");
    }
}
