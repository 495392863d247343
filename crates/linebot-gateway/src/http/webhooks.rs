//! C10 orchestrator: the one handler every inbound LINE event passes
//! through (§4.10). Ties C1 (signature/dedup), C2 (conversation store),
//! C3 (media fetch), C7 (logic engine), C5/C6 (RAG fallback) and C8
//! (dispatch) together; the global rule from §7 governs every status
//! code this handler returns.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use linebot_bots::Bot;
use linebot_conversations::InboundEvent;
use linebot_line::{is_verification_probe, parse_webhook_body, verify_signature, LineEvent, MediaFetchJob};
use linebot_logic::{evaluate, LogicEvent};
use linebot_protocol::frames::EnvelopeKind;
use linebot_retrieval::{classify, format_context, Intent, RetrievalMode, RetrievalSettings};

use crate::app::AppState;
use crate::notifier::GatewayNotifier;

const SIGNATURE_HEADER: &str = "x-line-signature";

/// `POST /api/v1/webhooks/{bot_id}` (§6). Always 200 once the signature
/// checked out and the bot exists — every downstream failure is absorbed
/// here rather than surfaced to LINE, which would otherwise retry and
/// amplify duplicates (§7 global rule).
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let bot = match state.bots.get(&bot_id) {
        Ok(Some(bot)) => bot,
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown bot").into_response(),
        Err(e) => {
            error!(error = %e, bot_id = %bot_id, "bot lookup failed");
            return (StatusCode::NOT_FOUND, "unknown bot").into_response();
        }
    };

    if !bot.is_configured() {
        return (StatusCode::BAD_REQUEST, "bot not configured").into_response();
    }

    if is_verification_probe(&body) {
        info!(bot_id = %bot_id, "verification probe received");
        return StatusCode::OK.into_response();
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let secret = bot.channel_secret.clone().unwrap_or_default();
    if verify_signature(&secret, &body, signature).is_err() {
        return (StatusCode::BAD_REQUEST, "invalid signature").into_response();
    }

    let events = match parse_webhook_body(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(bot_id = %bot_id, error = %e, "malformed webhook body");
            return (StatusCode::BAD_REQUEST, "malformed body").into_response();
        }
    };

    if state.config.server.concurrent_event_processing {
        let mut tasks = Vec::with_capacity(events.len());
        for event in events {
            let state = state.clone();
            let bot = bot.clone();
            tasks.push(tokio::spawn(async move { handle_one(&state, &bot, event).await }));
        }
        for task in tasks {
            let _ = task.await;
        }
    } else {
        // §5: sequential by default, preserving per-conversation ordering.
        for event in events {
            handle_one(&state, &bot, event).await;
        }
    }

    StatusCode::OK.into_response()
}

/// One decoded event, reduced to what C2/C7 need, common across the four
/// event shapes this orchestrator reacts to.
struct Decoded {
    line_message_id: Option<String>,
    event_type: String,
    message_type: String,
    content: Value,
    logic_event: LogicEvent,
    reply_token: Option<String>,
    text_for_rag: Option<String>,
    is_fetchable_media: bool,
}

fn decode(event: &LineEvent) -> Option<Decoded> {
    match event {
        LineEvent::Message {
            reply_token,
            line_message_id,
            message_type,
            text,
            raw,
            ..
        } => Some(Decoded {
            line_message_id: Some(line_message_id.clone()),
            event_type: "message".to_string(),
            message_type: message_type.clone(),
            content: raw.clone(),
            logic_event: LogicEvent::Message {
                message_type: message_type.clone(),
                text: text.clone(),
            },
            reply_token: reply_token.clone(),
            text_for_rag: if message_type == "text" { text.clone() } else { None },
            is_fetchable_media: matches!(message_type.as_str(), "image" | "video" | "audio"),
        }),
        LineEvent::Follow { reply_token, .. } => Some(Decoded {
            line_message_id: None,
            event_type: "follow".to_string(),
            message_type: "follow".to_string(),
            content: json!({}),
            logic_event: LogicEvent::Follow,
            reply_token: reply_token.clone(),
            text_for_rag: None,
            is_fetchable_media: false,
        }),
        LineEvent::Unfollow { .. } => Some(Decoded {
            line_message_id: None,
            event_type: "unfollow".to_string(),
            message_type: "unfollow".to_string(),
            content: json!({}),
            logic_event: LogicEvent::Unfollow,
            reply_token: None,
            text_for_rag: None,
            is_fetchable_media: false,
        }),
        LineEvent::Postback { reply_token, data, .. } => Some(Decoded {
            line_message_id: None,
            event_type: "postback".to_string(),
            message_type: "postback".to_string(),
            content: json!({ "data": data }),
            logic_event: LogicEvent::Postback { data: data.clone() },
            reply_token: reply_token.clone(),
            text_for_rag: None,
            is_fetchable_media: false,
        }),
        LineEvent::Other { .. } => None,
    }
}

/// §4.10 `handle_one`. Any failure here is logged and swallowed — the
/// ACK already happened (or will happen regardless) in `webhook_handler`.
async fn handle_one(state: &Arc<AppState>, bot: &Bot, event: LineEvent) {
    let Some(line_user_id) = event.user_id().filter(|id| !id.is_empty()) else {
        warn!(bot_id = %bot.id, "event missing user id, skipping");
        return;
    };
    let line_user_id = line_user_id.to_string();

    let Some(decoded) = decode(&event) else {
        info!(bot_id = %bot.id, event_type = event.event_type_str(), "ignoring unrecognized event type");
        return;
    };

    let inbound = InboundEvent {
        line_message_id: decoded.line_message_id.clone(),
        event_type: decoded.event_type.clone(),
        message_type: decoded.message_type.clone(),
        content: decoded.content.clone(),
    };

    let (message, is_new) = match state.conversations.append_user(&bot.id, &line_user_id, inbound) {
        Ok(result) => result,
        Err(e) => {
            error!(bot_id = %bot.id, error = %e, "failed to append user message");
            return;
        }
    };
    if !is_new {
        return; // §4.1/§7: duplicate_message — silent, no reply.
    }

    if decoded.is_fetchable_media {
        if let Some(line_message_id) = decoded.line_message_id.clone() {
            let job = MediaFetchJob {
                bot_id: Some(bot.id.clone()),
                message_id: message.id.clone(),
                line_message_id,
                message_type: decoded.message_type.clone(),
            };
            // A fresh client, not the cached one: `run_media_fetch_detached`
            // takes ownership and outlives this handler's borrow of `bot`.
            let line_client = linebot_line::LineClient::new(bot.channel_token.clone().unwrap_or_default());
            let object_store = state.object_store.clone();
            let bucket = state.media_bucket.clone();
            let conversations = state.conversations.clone();
            tokio::spawn(linebot_line::run_media_fetch_detached(
                job,
                line_client,
                object_store,
                bucket,
                conversations,
            ));
        }
    } else {
        state
            .broadcaster
            .broadcast(
                EnvelopeKind::NewUserMessage,
                &bot.id,
                Some(line_user_id.as_str()),
                json!({
                    "message_id": message.id,
                    "line_message_id": message.line_message_id,
                    "message_type": message.message_type,
                    "content": message.content,
                    "timestamp": message.timestamp,
                }),
            )
            .await;
    }

    let outcome = evaluate(
        &state.templates.active_for_bot(&bot.id).unwrap_or_default(),
        &decoded.logic_event,
        &bot.owner_id,
        bot.ai_takeover_enabled,
        &*state.flex_messages,
    );

    let line_client = state.line_client_for(bot);
    let notifier = GatewayNotifier {
        broadcaster: state.broadcaster.clone(),
    };
    let mut dispatcher = linebot_line::ReplyDispatcher::new(
        line_client.as_ref(),
        &state.conversations,
        &notifier,
        bot.id.clone(),
        line_user_id.clone(),
        decoded.reply_token.clone(),
    );

    if !outcome.messages.is_empty() {
        let payloads: Vec<(String, Value)> = outcome
            .messages
            .iter()
            .map(|m| (m.message_type.clone(), m.line_payload.clone()))
            .collect();
        if let Err(e) = dispatcher.send(&payloads).await {
            warn!(bot_id = %bot.id, error = %e, "reply dispatch failed");
        }
    } else if bot.ai_takeover_enabled {
        if let Some(text) = decoded.text_for_rag.as_deref() {
            run_ai_fallback(state, bot, &line_user_id, text, &mut dispatcher).await;
        }
    }

    state
        .broadcaster
        .broadcast(
            EnvelopeKind::ActivityUpdate,
            &bot.id,
            Some(line_user_id.as_str()),
            json!({
                "event_type": decoded.event_type,
                "message_type": decoded.message_type,
            }),
        )
        .await;
}

/// §4.5/§4.6 RAG fallback: intent classify, retrieve, ask, and — only on
/// a non-empty answer — dispatch one text message via C8.
async fn run_ai_fallback(
    state: &Arc<AppState>,
    bot: &Bot,
    line_user_id: &str,
    text: &str,
    dispatcher: &mut linebot_line::ReplyDispatcher<'_>,
) {
    let model = bot
        .ai_model
        .clone()
        .unwrap_or_else(|| state.config.llm.model.clone());

    let summaries = state.knowledge.recent_summaries(&bot.id, 10).unwrap_or_default();
    let intent = classify(&state.llm, &model, text, &summaries).await;

    let settings = RetrievalSettings {
        mode: RetrievalMode::from_str_lenient(&bot.ai_retrieval_mode),
        threshold: bot.ai_rag_threshold,
        k: bot.ai_rag_top_k as usize,
        rrf_k: state.config.retrieval.rrf_k,
        rerank_blend_alpha: Some(state.config.retrieval.rerank_blend_alpha),
        ..RetrievalSettings::default()
    };

    let context = if intent == Intent::Query {
        match state.retrieval.retrieve(&bot.id, text, &model, &settings).await {
            Ok(chunks) => format_context(&chunks),
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "retrieval failed, answering without context");
                String::new()
            }
        }
    } else {
        String::new()
    };

    let history = state
        .retrieval
        .history_for(&bot.id, line_user_id, bot.ai_history_messages)
        .unwrap_or_default();

    let ask = linebot_llm::AskRequest {
        question: text,
        context_text: if context.is_empty() { None } else { Some(context.as_str()) },
        history: &history,
        model: &model,
        system_prompt: bot.ai_system_prompt.as_deref(),
        provider: bot.ai_provider.as_deref(),
        max_tokens: None,
    };

    match state.llm.ask(ask).await {
        Ok(answer) if !answer.trim().is_empty() => {
            let payloads = vec![("text".to_string(), json!({ "type": "text", "text": answer }))];
            if let Err(e) = dispatcher.send(&payloads).await {
                warn!(bot_id = %bot.id, error = %e, "AI-generated reply dispatch failed");
            }
        }
        Ok(_) => {}
        Err(e) => {
            warn!(bot_id = %bot.id, error = %e, "llm_unavailable, no assistant message sent");
        }
    }
}
