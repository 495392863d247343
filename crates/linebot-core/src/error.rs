use thiserror::Error;

/// Umbrella error type the gateway's HTTP handlers map to status codes.
/// Component crates keep their own local error enums (`ConversationError`,
/// `KnowledgeError`, `LlmError`, `LogicError`, `LineError`, ...) and convert
/// into this one at the boundary where the taxonomy in the design doc
/// actually matters — at the webhook handler and the orchestrator.
#[derive(Debug, Error)]
pub enum LinebotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("unknown bot: {id}")]
    UnknownBot { id: String },

    #[error("bot misconfigured: {reason}")]
    BotMisconfigured { reason: String },

    #[error("duplicate message: {line_message_id}")]
    DuplicateMessage { line_message_id: String },

    #[error("media fetch failed: {0}")]
    MediaFetchFailed(String),

    #[error("retrieval produced no context: {0}")]
    RetrievalEmpty(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("logic template invalid ({template_id}): {reason}")]
    LogicTemplateInvalid { template_id: String, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl LinebotError {
    /// Short error code, matching the taxonomy kinds used across logs and
    /// the few places a code leaks into a client-visible response (the
    /// `/status` endpoint and WS `res` error frames).
    pub fn code(&self) -> &'static str {
        match self {
            LinebotError::Config(_) => "config_error",
            LinebotError::InvalidSignature => "invalid_signature",
            LinebotError::UnknownBot { .. } => "unknown_bot",
            LinebotError::BotMisconfigured { .. } => "bot_misconfigured",
            LinebotError::DuplicateMessage { .. } => "duplicate_message",
            LinebotError::MediaFetchFailed(_) => "media_fetch_failed",
            LinebotError::RetrievalEmpty(_) => "retrieval_empty",
            LinebotError::LlmUnavailable(_) => "llm_unavailable",
            LinebotError::LogicTemplateInvalid { .. } => "logic_template_invalid",
            LinebotError::SendFailed(_) => "send_failed",
            LinebotError::BroadcastFailed(_) => "broadcast_failed",
            LinebotError::Database(_) => "database_error",
            LinebotError::Serialization(_) => "serialization_error",
            LinebotError::Io(_) => "io_error",
            LinebotError::PayloadTooLarge { .. } => "payload_too_large",
            LinebotError::Timeout { .. } => "timeout",
            LinebotError::Internal(_) => "internal_error",
        }
    }

    /// Whether the webhook handler should still ACK with 200 after this
    /// error. Per the global rule: once the signature checked out and the
    /// bot exists, every downstream failure is absorbed rather than
    /// surfaced to LINE, which would otherwise retry and amplify duplicates.
    pub fn is_ackable(&self) -> bool {
        !matches!(
            self,
            LinebotError::InvalidSignature
                | LinebotError::UnknownBot { .. }
                | LinebotError::BotMisconfigured { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LinebotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_and_bot_errors_are_not_ackable() {
        assert!(!LinebotError::InvalidSignature.is_ackable());
        assert!(!LinebotError::UnknownBot { id: "b1".into() }.is_ackable());
        assert!(!LinebotError::BotMisconfigured {
            reason: "missing secret".into()
        }
        .is_ackable());
    }

    #[test]
    fn downstream_errors_are_ackable() {
        assert!(LinebotError::DuplicateMessage {
            line_message_id: "m-1".into()
        }
        .is_ackable());
        assert!(LinebotError::LlmUnavailable("timeout".into()).is_ackable());
        assert!(LinebotError::SendFailed("network".into()).is_ackable());
    }

    #[test]
    fn codes_match_taxonomy_kinds() {
        assert_eq!(LinebotError::InvalidSignature.code(), "invalid_signature");
        assert_eq!(
            LinebotError::DuplicateMessage {
                line_message_id: "x".into()
            }
            .code(),
            "duplicate_message"
        );
        assert_eq!(LinebotError::LlmUnavailable("x".into()).code(), "llm_unavailable");
    }
}
