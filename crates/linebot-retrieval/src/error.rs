use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Llm(#[from] linebot_llm::LlmError),
    #[error(transparent)]
    Knowledge(#[from] linebot_knowledge::KnowledgeError),
    #[error(transparent)]
    Conversation(#[from] linebot_conversations::ConversationError),
}

impl RetrievalError {
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::Llm(_) => "llm_unavailable",
            RetrievalError::Knowledge(_) => "retrieval_empty",
            RetrievalError::Conversation(_) => "database_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
