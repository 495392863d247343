//! Per-bot subscription channels and the Redis topic names they fan out
//! through (§4.9, §6 Redis).

use crate::frames::EnvelopeKind;

/// A subscribable channel within one bot's socket. Distinct from the
/// smaller set of Redis topics — `Chat` and `NewUserMessage` both relay
/// over the `bot` Redis topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionChannel {
    ChatMessage,
    NewUserMessage,
    ActivityUpdate,
    AnalyticsUpdate,
    WebhookStatusUpdate,
}

impl SubscriptionChannel {
    pub fn redis_topic(&self) -> RedisTopic {
        match self {
            SubscriptionChannel::ChatMessage | SubscriptionChannel::NewUserMessage => {
                RedisTopic::Bot
            }
            SubscriptionChannel::ActivityUpdate => RedisTopic::Activities,
            SubscriptionChannel::AnalyticsUpdate => RedisTopic::Analytics,
            SubscriptionChannel::WebhookStatusUpdate => RedisTopic::WebhookStatus,
        }
    }

    /// Maps an envelope kind back to the subscription channel it belongs
    /// to. Used by the Redis bridge to know which locally registered
    /// sockets should receive a frame that crossed from another process.
    /// `Connected`/`Subscribed`/`InitialData`/`Pong`/`Error` never cross
    /// the bridge — they're connection-local — so they have no channel.
    pub fn from_kind(kind: EnvelopeKind) -> Option<SubscriptionChannel> {
        match kind {
            EnvelopeKind::ChatMessage => Some(SubscriptionChannel::ChatMessage),
            EnvelopeKind::NewUserMessage => Some(SubscriptionChannel::NewUserMessage),
            EnvelopeKind::ActivityUpdate => Some(SubscriptionChannel::ActivityUpdate),
            EnvelopeKind::AnalyticsUpdate => Some(SubscriptionChannel::AnalyticsUpdate),
            EnvelopeKind::WebhookStatusUpdate => Some(SubscriptionChannel::WebhookStatusUpdate),
            _ => None,
        }
    }
}

/// The four Redis pub/sub topics named in §6: `ws:bot:{id}`,
/// `ws:analytics:{id}`, `ws:activities:{id}`, `ws:webhook_status:{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisTopic {
    Bot,
    Analytics,
    Activities,
    WebhookStatus,
}

impl RedisTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisTopic::Bot => "bot",
            RedisTopic::Analytics => "analytics",
            RedisTopic::Activities => "activities",
            RedisTopic::WebhookStatus => "webhook_status",
        }
    }

    /// Builds the channel name this topic publishes/subscribes on for a
    /// given bot, e.g. `ws:bot:abc123`.
    pub fn channel_name(&self, bot_id: &str) -> String {
        format!("ws:{}:{}", self.as_str(), bot_id)
    }

    /// Pattern used by the process-wide background subscriber to receive
    /// every topic for every bot in one `PSUBSCRIBE`.
    pub fn wildcard_pattern() -> &'static str {
        "ws:*"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_and_new_user_message_share_the_bot_topic() {
        assert_eq!(
            SubscriptionChannel::ChatMessage.redis_topic(),
            RedisTopic::Bot
        );
        assert_eq!(
            SubscriptionChannel::NewUserMessage.redis_topic(),
            RedisTopic::Bot
        );
    }

    #[test]
    fn from_kind_round_trips_for_broadcastable_kinds() {
        assert_eq!(
            SubscriptionChannel::from_kind(EnvelopeKind::ChatMessage),
            Some(SubscriptionChannel::ChatMessage)
        );
        assert_eq!(SubscriptionChannel::from_kind(EnvelopeKind::Connected), None);
        assert_eq!(SubscriptionChannel::from_kind(EnvelopeKind::Pong), None);
    }

    #[test]
    fn channel_name_matches_spec_format() {
        assert_eq!(RedisTopic::Bot.channel_name("b1"), "ws:bot:b1");
        assert_eq!(
            RedisTopic::WebhookStatus.channel_name("b1"),
            "ws:webhook_status:b1"
        );
    }
}
