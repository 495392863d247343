//! Cross-process fan-out (§4.9, §6 Redis, S7). Every broadcast is
//! delivered to this process's own locally registered sockets and
//! published to Redis in the same step; a background subscriber in every
//! process reads the wildcard pattern and replays onto its own local
//! sockets, skipping anything it just published itself.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{error, instrument, warn};

use linebot_protocol::channels::{RedisTopic, SubscriptionChannel};
use linebot_protocol::frames::{EnvelopeKind, WsEnvelope};

use super::dedup::ChatDedup;
use super::registry::WsRegistry;

pub struct Broadcaster {
    registry: Arc<WsRegistry>,
    dedup: ChatDedup,
    publish_conn: ConnectionManager,
    node_id: String,
}

impl Broadcaster {
    pub fn new(registry: Arc<WsRegistry>, publish_conn: ConnectionManager, node_id: String) -> Self {
        Self {
            registry,
            dedup: ChatDedup::new(),
            publish_conn,
            node_id,
        }
    }

    /// Broadcast a typed envelope to every subscriber of its channel, both
    /// locally and across processes. Kinds with no channel (`connected`,
    /// `subscribed`, `initial_data`, `pong`, `error`) are connection-local
    /// responses and must not be sent here.
    #[instrument(skip(self, data), fields(bot_id, kind = ?kind))]
    pub async fn broadcast(&self, kind: EnvelopeKind, bot_id: &str, line_user_id: Option<&str>, data: Value) {
        let Some(channel) = SubscriptionChannel::from_kind(kind) else {
            warn!(?kind, "attempted to broadcast a connection-local envelope kind");
            return;
        };

        if kind == EnvelopeKind::NewUserMessage {
            if let Some(line_message_id) = data.get("line_message_id").and_then(|v| v.as_str()) {
                if !self.dedup.admit(bot_id, line_message_id) {
                    return;
                }
            }
        }

        let mut envelope = WsEnvelope::new(kind, bot_id, data).with_source(self.node_id.clone());
        if let Some(uid) = line_user_id {
            envelope = envelope.with_line_user(uid);
        }

        let json = match serde_json::to_string(&envelope) {
            Ok(j) => j,
            Err(e) => {
                error!(error = %e, "failed to serialize WS envelope");
                return;
            }
        };

        self.registry.deliver_local(bot_id, channel, &json);
        self.publish_remote(channel, bot_id, &json).await;
    }

    async fn publish_remote(&self, channel: SubscriptionChannel, bot_id: &str, json: &str) {
        let topic_channel = channel.redis_topic().channel_name(bot_id);
        let mut conn = self.publish_conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(&topic_channel, json).await {
            error!(error = %e, channel = %topic_channel, "redis publish failed");
        }
    }
}

/// Background task: one per process, subscribes to every topic for every
/// bot via `ws:*` and replays onto local sockets, self-echo suppressed by
/// `meta.source`.
pub async fn run_subscriber(redis_url: String, registry: Arc<WsRegistry>, node_id: String) {
    loop {
        if let Err(e) = subscribe_loop(&redis_url, &registry, &node_id).await {
            error!(error = %e, "redis subscriber loop exited, retrying in 5s");
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

async fn subscribe_loop(
    redis_url: &str,
    registry: &Arc<WsRegistry>,
    node_id: &str,
) -> redis::RedisResult<()> {
    use futures_util::StreamExt;

    let client = redis::Client::open(redis_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(RedisTopic::wildcard_pattern()).await?;

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "undecodable redis pubsub payload");
                continue;
            }
        };

        let envelope: WsEnvelope = match serde_json::from_str(&payload) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed WS envelope on redis bridge");
                continue;
            }
        };

        if envelope.originated_from(node_id) {
            continue;
        }

        let Some(channel) = SubscriptionChannel::from_kind(envelope.kind) else {
            continue;
        };

        registry.deliver_local(&envelope.bot_id, channel, &payload);
    }

    Ok(())
}
