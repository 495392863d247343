use serde_json::{json, Value};

/// §4.7 "Action normalization": only the fields LINE requires for each
/// action type survive, with the documented defaults filled in.
pub fn normalize_action(action: &Value) -> Value {
    let action_type = action.get("type").and_then(Value::as_str).unwrap_or("message");
    let str_field = |key: &str| action.get(key).and_then(Value::as_str).unwrap_or("");

    match action_type {
        "message" => json!({
            "type": "message",
            "text": str_field("text"),
        }),
        "postback" => {
            let data = action
                .get("data")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("action=default");
            let mut out = json!({ "type": "postback", "data": data });
            if let Some(display_text) = action.get("displayText").and_then(Value::as_str) {
                if !display_text.is_empty() {
                    out["displayText"] = json!(display_text);
                }
            }
            out
        }
        "uri" => json!({
            "type": "uri",
            "uri": str_field("uri"),
        }),
        "datetimepicker" => {
            let data = action
                .get("data")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("action=default");
            let mode = action.get("mode").and_then(Value::as_str).unwrap_or("date");
            json!({ "type": "datetimepicker", "data": data, "mode": mode })
        }
        "richmenuswitch" => json!({
            "type": "richmenuswitch",
            "richMenuAliasId": str_field("richMenuAliasId"),
        }),
        other => json!({ "type": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postback_defaults_data_when_missing() {
        let out = normalize_action(&json!({ "type": "postback" }));
        assert_eq!(out["data"], "action=default");
        assert!(out.get("displayText").is_none());
    }

    #[test]
    fn datetimepicker_defaults_mode_to_date() {
        let out = normalize_action(&json!({ "type": "datetimepicker", "data": "pick" }));
        assert_eq!(out["mode"], "date");
        assert_eq!(out["data"], "pick");
    }

    #[test]
    fn message_action_only_carries_text() {
        let out = normalize_action(&json!({ "type": "message", "text": "hi", "extra": "drop me" }));
        assert_eq!(out, json!({ "type": "message", "text": "hi" }));
    }
}
