use std::time::Duration;

use linebot_knowledge::Document;
use linebot_llm::{AskRequest, LlmClient};

use crate::types::Intent;

const CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_SUMMARIES: usize = 10;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You classify one user message as either `chat` (small talk, greetings, \
anything not asking about the bot's own knowledge) or `query` (asking a question the knowledge base below might \
answer). Reply with exactly one word: chat or query.";

fn build_prompt(message_text: &str, summaries: &[Document]) -> String {
    let mut prompt = String::new();
    if !summaries.is_empty() {
        prompt.push_str("Known documents:\n");
        for doc in summaries.iter().take(MAX_SUMMARIES) {
            let summary = doc.ai_summary.as_deref().unwrap_or("");
            prompt.push_str(&format!("- {}: {}\n", doc.title, summary));
        }
        prompt.push('\n');
    }
    prompt.push_str("Message: ");
    prompt.push_str(message_text);
    prompt
}

/// §4.5 step 1. Classification failure (timeout, transport error, circuit
/// open, or an answer that doesn't parse) all degrade to `Query` — the
/// safer default, since skipping retrieval on a real question is worse
/// than retrieving for a greeting.
pub async fn classify(llm: &LlmClient, model: &str, message_text: &str, summaries: &[Document]) -> Intent {
    let prompt = build_prompt(message_text, summaries);
    let req = AskRequest {
        question: &prompt,
        context_text: None,
        history: &[],
        model,
        system_prompt: Some(CLASSIFIER_SYSTEM_PROMPT),
        provider: None,
        max_tokens: Some(16),
    };

    match llm.ask_with_timeout(req, CLASSIFIER_TIMEOUT).await {
        Ok(raw) => parse_intent(&raw),
        Err(_) => Intent::Query,
    }
}

fn parse_intent(raw: &str) -> Intent {
    let cleaned: String = raw.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
    if cleaned == "chat" {
        Intent::Chat
    } else {
        // Equals "query" or contains "query" → retrieve; anything else
        // also defaults to retrieving, per §4.5 step 1.
        Intent::Query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_chat_skips_retrieval() {
        assert_eq!(parse_intent("Chat"), Intent::Chat);
        assert_eq!(parse_intent(" chat. "), Intent::Chat);
    }

    #[test]
    fn query_or_containing_query_retrieves() {
        assert_eq!(parse_intent("query"), Intent::Query);
        assert_eq!(parse_intent("This is a query."), Intent::Query);
    }

    #[test]
    fn ambiguous_output_defaults_to_query() {
        assert_eq!(parse_intent("unsure"), Intent::Query);
        assert_eq!(parse_intent(""), Intent::Query);
    }
}
