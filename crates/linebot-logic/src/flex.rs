use serde_json::{json, Map, Value};

use crate::action::normalize_action;

const AREAS: [&str; 3] = ["header", "body", "footer"];

/// Convert a stored flex message's block-editor content (`blocks[]` with
/// `area` and `contentType`, §4.7) into a LINE Flex bubble, then apply the
/// null-drop / margin-coercion sanitizer required of every flex payload.
pub fn to_flex_bubble(content: &Value) -> Value {
    let blocks = content
        .get("blocks")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut bubble = Map::new();
    bubble.insert("type".to_string(), json!("bubble"));

    for area in AREAS {
        let components: Vec<Value> = blocks
            .iter()
            .filter(|b| b.get("area").and_then(Value::as_str) == Some(area))
            .map(convert_component)
            .collect();

        if !components.is_empty() {
            bubble.insert(
                area.to_string(),
                json!({ "type": "box", "layout": "vertical", "contents": components }),
            );
        }
    }

    let mut value = Value::Object(bubble);
    sanitize(&mut value);
    value
}

fn convert_component(block: &Value) -> Value {
    let content_type = block.get("contentType").and_then(Value::as_str).unwrap_or("text");

    match content_type {
        "text" => {
            let mut out = json!({
                "type": "text",
                "text": block.get("text").and_then(Value::as_str).unwrap_or(""),
            });
            copy_style_fields(block, &mut out, &["size", "weight", "color", "wrap", "align", "margin"]);
            out
        }
        "image" => {
            let mut out = json!({
                "type": "image",
                "url": block.get("url").and_then(Value::as_str).unwrap_or(""),
            });
            copy_style_fields(block, &mut out, &["size", "aspectRatio", "aspectMode", "margin"]);
            out
        }
        "button" => {
            let action = block
                .get("action")
                .map(normalize_action)
                .unwrap_or_else(|| json!({ "type": "message", "text": "" }));
            let mut out = json!({ "type": "button", "action": action });
            copy_style_fields(block, &mut out, &["style", "color", "height", "margin"]);
            out
        }
        "separator" => {
            let mut out = json!({ "type": "separator" });
            copy_style_fields(block, &mut out, &["margin", "color"]);
            out
        }
        "spacer" => json!({ "type": "filler" }),
        "box" => {
            let contents: Vec<Value> = block
                .get("blocks")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(convert_component).collect())
                .unwrap_or_default();
            let mut out = json!({
                "type": "box",
                "layout": block.get("layout").and_then(Value::as_str).unwrap_or("vertical"),
                "contents": contents,
            });
            copy_style_fields(block, &mut out, &["spacing", "margin", "paddingAll"]);
            out
        }
        other => json!({ "type": other }),
    }
}

fn copy_style_fields(src: &Value, dst: &mut Value, keys: &[&str]) {
    for key in keys {
        if let Some(v) = src.get(*key) {
            if !v.is_null() {
                dst[*key] = v.clone();
            }
        }
    }
}

/// Recursively drop null-valued fields and coerce `margin`/`spacing`/
/// `padding` object-shaped values down to a plain string, as §4.7
/// requires of every flex conversion.
fn sanitize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let is_null = matches!(map.get(&key), Some(Value::Null));
                if is_null {
                    map.remove(&key);
                    continue;
                }
                if is_spacing_key(&key) {
                    let coerced = map.get(&key).and_then(coerce_spacing_value);
                    match coerced {
                        Some(s) => {
                            map.insert(key.clone(), Value::String(s));
                        }
                        None => {
                            map.remove(&key);
                            continue;
                        }
                    }
                }
                if let Some(v) = map.get_mut(&key) {
                    sanitize(v);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize(item);
            }
        }
        _ => {}
    }
}

fn is_spacing_key(key: &str) -> bool {
    matches!(key, "margin" | "spacing" | "padding" | "paddingAll")
}

fn coerce_spacing_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("value")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| map.values().find_map(|v| v.as_str().map(String::from))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_text_and_button_into_separate_areas() {
        let content = json!({
            "blocks": [
                { "area": "body", "contentType": "text", "text": "hello", "margin": null },
                { "area": "footer", "contentType": "button", "action": { "type": "message", "text": "ok" } },
            ]
        });
        let bubble = to_flex_bubble(&content);
        assert_eq!(bubble["type"], "bubble");
        assert_eq!(bubble["body"]["contents"][0]["text"], "hello");
        assert!(bubble["body"]["contents"][0].get("margin").is_none());
        assert_eq!(bubble["footer"]["contents"][0]["action"]["text"], "ok");
        assert!(bubble.get("header").is_none());
    }

    #[test]
    fn coerces_object_margin_to_string() {
        let content = json!({
            "blocks": [
                { "area": "body", "contentType": "box", "layout": "vertical", "margin": { "value": "md" }, "blocks": [] },
            ]
        });
        let bubble = to_flex_bubble(&content);
        assert_eq!(bubble["body"]["contents"][0]["margin"], "md");
    }

    #[test]
    fn spacer_becomes_filler() {
        let content = json!({ "blocks": [ { "area": "body", "contentType": "spacer" } ] });
        let bubble = to_flex_bubble(&content);
        assert_eq!(bubble["body"]["contents"][0]["type"], "filler");
    }
}
