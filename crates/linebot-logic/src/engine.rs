use serde_json::json;
use tracing::warn;

use crate::flex::to_flex_bubble;
use crate::types::{
    Block, BlockType, EvalOutcome, EventBlockData, FlexMessageLookup, LogicEvent, LogicTemplate,
    OutboundMessage, ReplyBlockData,
};

const MAX_CHAINED_REPLIES: usize = 5;
const FALLBACK_TEXT: &str = "...";

/// §4.7: evaluate a bot's active templates against one event, first hit
/// wins across templates. Templates are re-sorted here by
/// `(updated_at desc, id asc)` so tie-breaking is deterministic
/// regardless of what order the caller fetched them in.
///
/// A template whose matched event block defers to AI (rule 6) does not
/// stop the scan — it only takes itself out of the running. A
/// conditional keyword match in a lower-priority template still wins
/// over a higher-priority template's unconditional deferral; RAG only
/// runs when no remaining template produces messages.
pub fn evaluate(
    templates: &[LogicTemplate],
    event: &LogicEvent,
    owner_id: &str,
    ai_takeover_enabled: bool,
    flex_lookup: &dyn FlexMessageLookup,
) -> EvalOutcome {
    let mut ordered: Vec<&LogicTemplate> = templates.iter().filter(|t| t.is_active).collect();
    ordered.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

    let mut deferred_to_ai = false;
    for template in ordered {
        match evaluate_template(template, event, owner_id, ai_takeover_enabled, flex_lookup) {
            Some(TemplateHit::Messages(messages)) => {
                return EvalOutcome { messages, deferred_to_ai: false }
            }
            Some(TemplateHit::DeferToAi) => {
                deferred_to_ai = true;
                continue;
            }
            None => continue,
        }
    }

    EvalOutcome { messages: Vec::new(), deferred_to_ai }
}

enum TemplateHit {
    Messages(Vec<OutboundMessage>),
    DeferToAi,
}

fn evaluate_template(
    template: &LogicTemplate,
    event: &LogicEvent,
    owner_id: &str,
    ai_takeover_enabled: bool,
    flex_lookup: &dyn FlexMessageLookup,
) -> Option<TemplateHit> {
    let blocks = &template.logic_blocks;
    let event_blocks: Vec<&Block> = blocks.iter().filter(|b| b.block_type == BlockType::Event).collect();

    let mut conditional = Vec::new();
    let mut unconditional = Vec::new();
    for block in &event_blocks {
        let data: EventBlockData = match serde_json::from_value(block.block_data.clone()) {
            Ok(d) => d,
            Err(e) => {
                warn!(template_id = %template.id, error = %e, "event block blockData invalid, skipping block");
                continue;
            }
        };
        if !matches_event_kind(event, &data.event_type) {
            continue;
        }
        if is_conditional(&data) {
            conditional.push((*block, data));
        } else {
            unconditional.push((*block, data));
        }
    }

    let matched = conditional
        .into_iter()
        .find(|(_, data)| matches_conditional(event, data))
        .or_else(|| unconditional.into_iter().next());

    let (event_block, data) = matched?;

    if ai_takeover_enabled
        && matches!(event, LogicEvent::Message { message_type, .. } if message_type == "text")
        && is_ai_deferrable(&data)
    {
        return Some(TemplateHit::DeferToAi);
    }

    let messages = collect_reply_chain(blocks, event_block, owner_id, flex_lookup);
    if messages.is_empty() {
        None
    } else {
        Some(TemplateHit::Messages(messages))
    }
}

fn matches_event_kind(event: &LogicEvent, event_type: &str) -> bool {
    match event {
        LogicEvent::Message { message_type, .. } => match event_type {
            "message" => true,
            "message.text" => message_type == "text",
            "message.image" => message_type == "image",
            "message.video" => message_type == "video",
            "message.audio" => message_type == "audio",
            _ => false,
        },
        LogicEvent::Postback { .. } => event_type == "postback",
        LogicEvent::Follow => event_type == "follow",
        LogicEvent::Unfollow => event_type == "unfollow",
    }
}

fn is_conditional(data: &EventBlockData) -> bool {
    match data.event_type.as_str() {
        "message.text" => data.effective_condition().is_some(),
        "postback" => data.data.as_deref().is_some_and(|d| !d.is_empty()),
        _ => false,
    }
}

/// Only event blocks that would otherwise fire unconditionally on plain
/// text defer to AI — a keyword match is still a deliberate scripted
/// response and wins over the takeover (§4.7 rule 6).
fn is_ai_deferrable(data: &EventBlockData) -> bool {
    matches!(data.event_type.as_str(), "message.text" | "message") && !is_conditional(data)
}

fn matches_conditional(event: &LogicEvent, data: &EventBlockData) -> bool {
    match (event, data.event_type.as_str()) {
        (LogicEvent::Message { text, .. }, "message.text") => {
            let Some(condition) = data.effective_condition() else {
                return false;
            };
            text_condition_matches(condition, data.case_sensitive.unwrap_or(false), text.as_deref().unwrap_or(""))
        }
        (LogicEvent::Postback { data: incoming }, "postback") => {
            data.data.as_deref() == Some(incoming.as_str())
        }
        _ => false,
    }
}

fn text_condition_matches(condition: &str, case_sensitive: bool, message_text: &str) -> bool {
    let adjust = |s: &str| if case_sensitive { s.to_string() } else { s.to_lowercase() };
    let haystack = adjust(message_text);

    if condition.contains(',') {
        condition
            .split(',')
            .map(|kw| adjust(kw.trim()))
            .filter(|kw| !kw.is_empty())
            .any(|kw| haystack == kw || haystack.contains(&kw))
    } else {
        let needle = adjust(condition);
        haystack == needle || haystack.contains(&needle)
    }
}

/// Find the reply block chain for a matched event block: prefer the
/// reply block explicitly wired to it via `connectedTo`/`parentId`,
/// else the template's first reply block. From there, walk forward
/// through the original block order collecting up to
/// `MAX_CHAINED_REPLIES` contiguous reply blocks, stopping at the next
/// event block (flex-content/flex-layout blocks are skipped over, not
/// counted, and not treated as a stop condition).
fn collect_reply_chain(
    blocks: &[Block],
    event_block: &Block,
    owner_id: &str,
    flex_lookup: &dyn FlexMessageLookup,
) -> Vec<OutboundMessage> {
    let wired_idx = blocks.iter().position(|b| {
        b.block_type == BlockType::Reply
            && (b.connected_to.as_deref() == Some(event_block.id.as_str())
                || b.parent_id.as_deref() == Some(event_block.id.as_str()))
    });
    let start_idx = wired_idx.or_else(|| blocks.iter().position(|b| b.block_type == BlockType::Reply));

    let Some(start_idx) = start_idx else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for block in &blocks[start_idx..] {
        if out.len() >= MAX_CHAINED_REPLIES {
            break;
        }
        match block.block_type {
            BlockType::Event => break,
            BlockType::Reply => {
                let data: ReplyBlockData = match serde_json::from_value(block.block_data.clone()) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(block_id = %block.id, error = %e, "reply block blockData invalid, skipping");
                        continue;
                    }
                };
                if let Some(msg) = reply_to_outbound(&data, owner_id, flex_lookup) {
                    out.push(msg);
                }
            }
            BlockType::FlexContent | BlockType::FlexLayout => continue,
        }
    }
    out
}

fn reply_to_outbound(
    data: &ReplyBlockData,
    owner_id: &str,
    flex_lookup: &dyn FlexMessageLookup,
) -> Option<OutboundMessage> {
    match data.reply_type.as_str() {
        "text" => {
            let text = data.text.as_deref().filter(|s| !s.is_empty()).unwrap_or(FALLBACK_TEXT);
            Some(OutboundMessage {
                message_type: "text".to_string(),
                line_payload: json!({ "type": "text", "text": text }),
                media_url: None,
            })
        }
        "flex" => {
            let content = data
                .flex_message_id
                .as_deref()
                .and_then(|id| flex_lookup.get(owner_id, id))
                .or_else(|| data.flex_content.clone())?;
            let bubble = to_flex_bubble(&content);
            Some(OutboundMessage {
                message_type: "flex".to_string(),
                line_payload: json!({ "type": "flex", "altText": "flex message", "contents": bubble }),
                media_url: None,
            })
        }
        "image" => {
            let original = data.original_content_url.as_deref()?;
            let preview = data.preview_image_url.as_deref().unwrap_or(original);
            Some(OutboundMessage {
                message_type: "image".to_string(),
                line_payload: json!({
                    "type": "image",
                    "originalContentUrl": original,
                    "previewImageUrl": preview,
                }),
                media_url: Some(original.to_string()),
            })
        }
        "sticker" => {
            let package_id = data.package_id.as_deref()?;
            let sticker_id = data.sticker_id.as_deref()?;
            Some(OutboundMessage {
                message_type: "sticker".to_string(),
                line_payload: json!({
                    "type": "sticker",
                    "packageId": package_id,
                    "stickerId": sticker_id,
                }),
                media_url: None,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoFlexMessages;
    use serde_json::json;

    fn template(blocks: Vec<Block>) -> LogicTemplate {
        LogicTemplate {
            id: "t1".to_string(),
            bot_id: "bot-1".to_string(),
            name: "welcome".to_string(),
            is_active: true,
            logic_blocks: blocks,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn event_block(id: &str, event_type: &str, condition: Option<&str>) -> Block {
        Block {
            id: id.to_string(),
            block_type: BlockType::Event,
            block_data: json!({ "eventType": event_type, "condition": condition }),
            parent_id: None,
            connected_to: None,
        }
    }

    fn reply_text_block(id: &str, connected_to: &str, text: &str) -> Block {
        Block {
            id: id.to_string(),
            block_type: BlockType::Reply,
            block_data: json!({ "replyType": "text", "text": text }),
            parent_id: None,
            connected_to: Some(connected_to.to_string()),
        }
    }

    #[test]
    fn keyword_condition_matches_case_insensitively() {
        let tmpl = template(vec![
            event_block("e1", "message.text", Some("help,menu")),
            reply_text_block("r1", "e1", "hello"),
        ]);
        let event = LogicEvent::Message { message_type: "text".into(), text: Some("Please show MENU".into()) };
        let outcome = evaluate(&[tmpl], &event, "owner-1", false, &NoFlexMessages);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].line_payload["text"], "hello");
    }

    #[test]
    fn ai_takeover_defers_unconditional_text_but_not_keyword_match() {
        let scripted = template(vec![
            event_block("e1", "message.text", None),
            reply_text_block("r1", "e1", "scripted"),
        ]);
        let event = LogicEvent::Message { message_type: "text".into(), text: Some("anything".into()) };
        let outcome = evaluate(&[scripted], &event, "owner-1", true, &NoFlexMessages);
        assert!(outcome.deferred_to_ai);
        assert!(outcome.messages.is_empty());
    }

    #[test]
    fn keyword_match_in_lower_priority_template_still_wins_over_deferral() {
        let mut newer = template(vec![
            event_block("e1", "message.text", None),
            reply_text_block("r1", "e1", "scripted-newer"),
        ]);
        newer.id = "newer".to_string();
        newer.updated_at = "2026-02-01T00:00:00Z".to_string();

        let mut older = template(vec![
            event_block("e1", "message.text", Some("menu")),
            reply_text_block("r1", "e1", "from-older"),
        ]);
        older.id = "older".to_string();
        older.updated_at = "2026-01-01T00:00:00Z".to_string();

        let event = LogicEvent::Message { message_type: "text".into(), text: Some("show menu".into()) };
        let outcome = evaluate(&[newer, older], &event, "owner-1", true, &NoFlexMessages);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].line_payload["text"], "from-older");
        assert!(!outcome.deferred_to_ai);
    }

    #[test]
    fn all_templates_defer_yields_no_messages_and_deferred_flag() {
        let mut t1 = template(vec![
            event_block("e1", "message.text", None),
            reply_text_block("r1", "e1", "one"),
        ]);
        t1.id = "t1".to_string();
        let mut t2 = template(vec![
            event_block("e1", "message", None),
            reply_text_block("r1", "e1", "two"),
        ]);
        t2.id = "t2".to_string();

        let event = LogicEvent::Message { message_type: "text".into(), text: Some("anything".into()) };
        let outcome = evaluate(&[t1, t2], &event, "owner-1", true, &NoFlexMessages);
        assert!(outcome.messages.is_empty());
        assert!(outcome.deferred_to_ai);
    }

    #[test]
    fn follow_event_matches_unconditional_follow_block() {
        let tmpl = template(vec![
            event_block("e1", "follow", None),
            reply_text_block("r1", "e1", "welcome!"),
        ]);
        let outcome = evaluate(&[tmpl], &LogicEvent::Follow, "owner-1", false, &NoFlexMessages);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].line_payload["text"], "welcome!");
    }

    #[test]
    fn reply_chain_stops_at_next_event_block_and_caps_at_five() {
        let mut blocks = vec![event_block("e1", "message.text", None)];
        for i in 0..7 {
            blocks.push(reply_text_block(&format!("r{i}"), "e1", &format!("msg{i}")));
        }
        blocks.push(event_block("e2", "postback", Some("x")));
        blocks.push(reply_text_block("r-after", "e2", "should not appear"));

        let tmpl = template(blocks);
        let event = LogicEvent::Message { message_type: "text".into(), text: Some("hi".into()) };
        let outcome = evaluate(&[tmpl], &event, "owner-1", false, &NoFlexMessages);
        assert_eq!(outcome.messages.len(), MAX_CHAINED_REPLIES);
        assert_eq!(outcome.messages[0].line_payload["text"], "msg0");
    }

    #[test]
    fn ties_broken_deterministically_by_id_when_updated_at_equal() {
        let mut tmpl_b = template(vec![
            event_block("e1", "message.text", None),
            reply_text_block("r1", "e1", "from-b"),
        ]);
        tmpl_b.id = "b".to_string();
        let mut tmpl_a = template(vec![
            event_block("e1", "message.text", None),
            reply_text_block("r1", "e1", "from-a"),
        ]);
        tmpl_a.id = "a".to_string();

        let event = LogicEvent::Message { message_type: "text".into(), text: Some("hi".into()) };
        let outcome = evaluate(&[tmpl_b, tmpl_a], &event, "owner-1", false, &NoFlexMessages);
        assert_eq!(outcome.messages[0].line_payload["text"], "from-a");
    }
}
