//! Axum WebSocket upgrade handlers for the two endpoint shapes in §4.9:
//! `/ws/bot/{bot_id}` (operator watching one bot) and
//! `/ws/dashboard/{user_id}` (user watching all their bots).

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use linebot_protocol::channels::SubscriptionChannel;
use linebot_protocol::frames::{ControlFrame, EnvelopeKind, WsEnvelope};
use linebot_protocol::handshake::{
    ConnectedPayload, ConnectionScope, InitialDataPayload, SubscribedPayload, WsHandshakeQuery,
};

use crate::app::AppState;
use crate::auth::{self, TokenScope};

const MPSC_CAPACITY: usize = 64;

pub async fn bot_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Query(query): Query<WsHandshakeQuery>,
) -> impl IntoResponse {
    if !auth::verify(&ws_secret(&state), &query.token, TokenScope::Bot, &bot_id) {
        return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response();
    }

    ws.on_upgrade(move |socket| {
        handle_socket(socket, state, vec![bot_id], ConnectionScope::Bot)
    })
    .into_response()
}

pub async fn dashboard_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<WsHandshakeQuery>,
) -> impl IntoResponse {
    if !auth::verify(&ws_secret(&state), &query.token, TokenScope::Dashboard, &user_id) {
        return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response();
    }

    let bot_ids = match state.bots.list_by_owner(&user_id) {
        Ok(bots) => bots.into_iter().map(|b| b.id).collect::<Vec<_>>(),
        Err(e) => {
            warn!(error = %e, user_id = %user_id, "failed to list bots for dashboard socket");
            Vec::new()
        }
    };

    ws.on_upgrade(move |socket| {
        handle_socket(socket, state, bot_ids, ConnectionScope::Dashboard)
    })
    .into_response()
}

fn ws_secret(state: &AppState) -> String {
    std::env::var(&state.config.server.ws_token_secret_env).unwrap_or_default()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, bot_ids: Vec<String>, scope: ConnectionScope) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let dashboard = matches!(scope, ConnectionScope::Dashboard);
    info!(conn_id = %conn_id, bots = bot_ids.len(), dashboard, "WS connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut local_rx) = mpsc::channel::<String>(MPSC_CAPACITY);

    for bot_id in &bot_ids {
        state.ws_registry.register(bot_id, &conn_id, tx.clone(), dashboard);
    }

    let primary_bot = bot_ids.first().cloned().unwrap_or_default();
    let connected = WsEnvelope::new(
        EnvelopeKind::Connected,
        primary_bot.clone(),
        ConnectedPayload {
            node_id: state.node_id.clone(),
            scope,
        },
    );
    if send_envelope(&mut sink, &connected).await.is_err() {
        for bot_id in &bot_ids {
            state.ws_registry.unregister(bot_id, &conn_id);
        }
        return;
    }

    let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(
        state.config.server.ws_heartbeat_secs,
    ));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_control_frame(&text, &conn_id, &bot_ids, &primary_bot, &state, &mut sink).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "WS read error");
                        break;
                    }
                    _ => {}
                }
            }

            relayed = local_rx.recv() => {
                match relayed {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    for bot_id in &bot_ids {
        state.ws_registry.unregister(bot_id, &conn_id);
    }
    info!(conn_id = %conn_id, "WS connection closed");
}

/// §4.9 control frames: `ping`→`pong`, `subscribe_*`, `get_initial_data`.
/// Unknown `type` values still yield a response (`error`) without closing
/// the socket.
async fn handle_control_frame(
    text: &str,
    conn_id: &str,
    bot_ids: &[String],
    primary_bot: &str,
    state: &Arc<AppState>,
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) {
    let frame: Result<ControlFrame, _> = serde_json::from_str(text);
    match frame {
        Ok(ControlFrame::Ping { ts }) => {
            let envelope = WsEnvelope::new(
                EnvelopeKind::Pong,
                primary_bot.to_string(),
                json!({ "ts": ts }),
            );
            let _ = send_envelope(sink, &envelope).await;
        }
        Ok(ControlFrame::SubscribeAnalytics) => {
            subscribe_all(bot_ids, conn_id, state, SubscriptionChannel::AnalyticsUpdate);
            ack_subscribed(sink, primary_bot, "analytics_update").await;
        }
        Ok(ControlFrame::SubscribeActivities) => {
            subscribe_all(bot_ids, conn_id, state, SubscriptionChannel::ActivityUpdate);
            ack_subscribed(sink, primary_bot, "activity_update").await;
        }
        Ok(ControlFrame::SubscribeWebhookStatus) => {
            subscribe_all(bot_ids, conn_id, state, SubscriptionChannel::WebhookStatusUpdate);
            ack_subscribed(sink, primary_bot, "webhook_status_update").await;
        }
        Ok(ControlFrame::GetInitialData) => {
            let is_configured = state
                .bots
                .get(primary_bot)
                .ok()
                .flatten()
                .map(|b| b.is_configured())
                .unwrap_or(false);
            let envelope = WsEnvelope::new(
                EnvelopeKind::InitialData,
                primary_bot.to_string(),
                InitialDataPayload {
                    bot_id: primary_bot.to_string(),
                    is_configured,
                },
            );
            let _ = send_envelope(sink, &envelope).await;
        }
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "unrecognized WS control frame");
            let envelope = WsEnvelope::new(
                EnvelopeKind::Error,
                primary_bot.to_string(),
                json!({ "code": "unknown_frame_type", "message": e.to_string() }),
            );
            let _ = send_envelope(sink, &envelope).await;
        }
    }
}

fn subscribe_all(bot_ids: &[String], conn_id: &str, state: &Arc<AppState>, channel: SubscriptionChannel) {
    for bot_id in bot_ids {
        state.ws_registry.subscribe(bot_id, conn_id, channel);
    }
}

async fn ack_subscribed(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    bot_id: &str,
    channel_name: &str,
) {
    let envelope = WsEnvelope::new(
        EnvelopeKind::Subscribed,
        bot_id.to_string(),
        SubscribedPayload {
            channel: channel_name.to_string(),
        },
    );
    let _ = send_envelope(sink, &envelope).await;
}

async fn send_envelope(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    envelope: &WsEnvelope,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(envelope).unwrap_or_default();
    sink.send(Message::Text(json.into())).await
}
