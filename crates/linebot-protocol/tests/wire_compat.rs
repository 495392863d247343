// Verify the WS envelope and control frame wire format matches §6 of the
// design doc. These tests exist so the format never drifts silently.

use linebot_protocol::channels::RedisTopic;
use linebot_protocol::frames::{ControlFrame, EnvelopeKind, WsEnvelope};

#[test]
fn envelope_serializes_with_kind_as_type_field() {
    let env = WsEnvelope::new(EnvelopeKind::ChatMessage, "bot-1", serde_json::json!({"text": "hi"}));
    let json = serde_json::to_string(&env).unwrap();

    assert!(json.contains(r#""type":"chat_message""#));
    assert!(json.contains(r#""bot_id":"bot-1""#));
    // line_user_id absent when not set
    assert!(!json.contains("line_user_id"));
    // meta absent until tagged with a source node
    assert!(!json.contains("\"meta\""));
}

#[test]
fn envelope_with_source_round_trips_originated_from() {
    let env = WsEnvelope::new(EnvelopeKind::ActivityUpdate, "bot-1", serde_json::json!({}))
        .with_source("node-a");

    assert!(env.originated_from("node-a"));
    assert!(!env.originated_from("node-b"));
}

#[test]
fn envelope_with_line_user_includes_field() {
    let env = WsEnvelope::new(EnvelopeKind::NewUserMessage, "bot-1", serde_json::json!({}))
        .with_line_user("U123");
    let json = serde_json::to_string(&env).unwrap();
    assert!(json.contains(r#""line_user_id":"U123""#));
}

#[test]
fn control_frame_parses_ping() {
    let json = r#"{"type":"ping","ts":1234567890}"#;
    let frame: ControlFrame = serde_json::from_str(json).unwrap();
    assert!(matches!(frame, ControlFrame::Ping { .. }));
}

#[test]
fn control_frame_parses_subscribe_variants() {
    let json = r#"{"type":"subscribe_analytics"}"#;
    let frame: ControlFrame = serde_json::from_str(json).unwrap();
    assert!(matches!(frame, ControlFrame::SubscribeAnalytics));

    let json = r#"{"type":"get_initial_data"}"#;
    let frame: ControlFrame = serde_json::from_str(json).unwrap();
    assert!(matches!(frame, ControlFrame::GetInitialData));
}

#[test]
fn control_frame_rejects_unknown_type() {
    let json = r#"{"type":"frobnicate"}"#;
    let result: Result<ControlFrame, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn redis_channel_names_match_spec() {
    assert_eq!(RedisTopic::Bot.channel_name("b1"), "ws:bot:b1");
    assert_eq!(RedisTopic::Analytics.channel_name("b1"), "ws:analytics:b1");
    assert_eq!(RedisTopic::Activities.channel_name("b1"), "ws:activities:b1");
    assert_eq!(
        RedisTopic::WebhookStatus.channel_name("b1"),
        "ws:webhook_status:b1"
    );
}
