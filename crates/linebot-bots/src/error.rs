use thiserror::Error;

/// Bot-store errors. Kept separate from `LinebotError` so the orchestrator
/// can map `NotFound` to `unknown_bot` / 404 without coupling layers.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("bot not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
}

impl BotError {
    pub fn code(&self) -> &'static str {
        match self {
            BotError::NotFound(_) => "unknown_bot",
            BotError::DatabaseError(_) => "database_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
