use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found: bot={bot_id} line_user={line_user_id}")]
    NotFound { bot_id: String, line_user_id: String },

    #[error("message not found: {id}")]
    MessageNotFound { id: String },

    #[error("duplicate message: {line_message_id}")]
    DuplicateMessage { line_message_id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ConversationError {
    pub fn code(&self) -> &'static str {
        match self {
            ConversationError::NotFound { .. } => "conversation_not_found",
            ConversationError::MessageNotFound { .. } => "message_not_found",
            ConversationError::DuplicateMessage { .. } => "duplicate_message",
            ConversationError::InvalidData(_) => "invalid_data",
            ConversationError::Database(_) => "database_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversationError>;
