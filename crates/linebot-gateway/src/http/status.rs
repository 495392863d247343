//! §6 `/status`, plus the supplemented `/ping` and `/connections` admin
//! views — none of these touch C1-C10's event path, they only report on
//! it.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use linebot_line::LineClient;

use crate::app::AppState;

/// `GET /api/v1/webhooks/{bot_id}/status` (§6). `status` is one of
/// `not_configured`, `configuration_error`, `active`, `inactive`, `error`;
/// `status_text` is the human-readable counterpart shown on a dashboard.
pub async fn status_handler(State(state): State<Arc<AppState>>, Path(bot_id): Path<String>) -> impl IntoResponse {
    let checked_at = chrono::Utc::now().to_rfc3339();
    let webhook_url = format!(
        "{}/api/v1/webhooks/{}",
        state.config.server.public_base_url.trim_end_matches('/'),
        bot_id
    );

    let bot = match state.bots.get(&bot_id) {
        Ok(Some(bot)) => bot,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "status": "not_configured",
                    "status_text": "unknown bot",
                    "is_configured": false,
                    "line_api_accessible": false,
                    "webhook_working": false,
                    "webhook_url": webhook_url,
                    "checked_at": checked_at,
                })),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "status_text": format!("bot lookup failed: {e}"),
                    "is_configured": false,
                    "line_api_accessible": false,
                    "webhook_working": false,
                    "webhook_url": webhook_url,
                    "checked_at": checked_at,
                })),
            )
                .into_response();
        }
    };

    if !bot.is_configured() {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "not_configured",
                "status_text": "channel token and/or secret missing",
                "is_configured": false,
                "line_api_accessible": false,
                "webhook_working": false,
                "webhook_url": webhook_url,
                "checked_at": checked_at,
            })),
        )
            .into_response();
    }

    let probe = LineClient::new(bot.channel_token.clone().unwrap_or_default());
    let line_api_accessible = probe.bot_info_accessible().await;

    let (status, status_text) = if line_api_accessible {
        ("active", "bot is configured and reachable")
    } else {
        ("configuration_error", "LINE rejected the channel token")
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "status_text": status_text,
            "is_configured": true,
            "line_api_accessible": line_api_accessible,
            "webhook_working": line_api_accessible,
            "webhook_url": webhook_url,
            "checked_at": checked_at,
        })),
    )
        .into_response()
}

/// §9 supplemented feature: a liveness check cheap enough for a monitor
/// to poll every few seconds — no outbound call to LINE, just confirms
/// the process is up and the bot exists.
pub async fn ping_handler(State(state): State<Arc<AppState>>, Path(bot_id): Path<String>) -> impl IntoResponse {
    match state.bots.get(&bot_id) {
        Ok(Some(_)) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "ok": false }))).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false }))).into_response(),
    }
}

/// §9 supplemented feature: how many WebSocket clients are currently
/// attached to this bot's channel on this node.
pub async fn connections_handler(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
) -> impl IntoResponse {
    let count = state.ws_registry.connection_count(&bot_id);
    (StatusCode::OK, Json(json!({ "bot_id": bot_id, "connections": count }))).into_response()
}
