/// Base system instructions every bot's `ask` call carries, before the
/// per-bot `ai_system_prompt` is appended. §4.6 requires plain text only —
/// the chat bubble can't render Markdown — so the model is steered toward
/// fullwidth brackets and middle-dots instead of bullets/headings.
pub const BASE_SYSTEM_PROMPT: &str = "\
你是一個透過 LINE 聊天室回覆使用者的助理。請只使用純文字回覆：\
不要使用 Markdown 粗體、標題、條列符號或程式碼區塊。\
需要強調或條列時，請改用全形括號「」與中點‧，例如「重點」或 項目一‧項目二。\
回覆應簡潔、直接回答問題。";

pub fn system_prompt(per_bot: Option<&str>) -> String {
    match per_bot {
        Some(extra) if !extra.trim().is_empty() => {
            format!("{BASE_SYSTEM_PROMPT}\n\n{extra}")
        }
        _ => BASE_SYSTEM_PROMPT.to_string(),
    }
}

/// Known per-model maximum output tokens. Unknown models fall back to a
/// conservative 4096 — safer than guessing a provider's true ceiling.
pub fn known_model_max_tokens(model: &str) -> u32 {
    match model {
        m if m.starts_with("gpt-4o") => 16_384,
        m if m.starts_with("gpt-4") => 8_192,
        m if m.starts_with("gpt-3.5") => 4_096,
        m if m.starts_with("claude-3-5") || m.starts_with("claude-3.5") => 8_192,
        m if m.starts_with("claude-3") => 4_096,
        m if m.starts_with("claude-opus-4") || m.starts_with("claude-sonnet-4") => 32_000,
        _ => 4_096,
    }
}

/// §4.6: "if not specified, use 80% of the selected model's maximum,
/// floor 2048, cap at model's maximum."
pub fn resolve_max_tokens(requested: Option<u32>, model_max: u32) -> u32 {
    match requested {
        Some(v) => v.min(model_max),
        None => {
            let eighty_percent = (model_max as f64 * 0.8).round() as u32;
            eighty_percent.max(2048).min(model_max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_eighty_percent_floored_at_2048() {
        assert_eq!(resolve_max_tokens(None, 4096), 3277);
        assert_eq!(resolve_max_tokens(None, 2048), 2048);
        assert_eq!(resolve_max_tokens(None, 1000), 2048.min(1000));
    }

    #[test]
    fn explicit_request_is_capped_at_model_max() {
        assert_eq!(resolve_max_tokens(Some(100_000), 8192), 8192);
        assert_eq!(resolve_max_tokens(Some(100), 8192), 100);
    }

    #[test]
    fn system_prompt_appends_per_bot_instructions() {
        let combined = system_prompt(Some("永遠用繁體中文回覆"));
        assert!(combined.contains(BASE_SYSTEM_PROMPT));
        assert!(combined.contains("永遠用繁體中文回覆"));
    }

    #[test]
    fn system_prompt_without_extra_is_just_base() {
        assert_eq!(system_prompt(None), BASE_SYSTEM_PROMPT);
        assert_eq!(system_prompt(Some("  ")), BASE_SYSTEM_PROMPT);
    }
}
