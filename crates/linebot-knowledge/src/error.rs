use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("embedding has wrong dimension: expected {expected}, got {got}")]
    WrongDimension { expected: usize, got: usize },

    #[error("retrieval produced no results: {0}")]
    RetrievalEmpty(String),
}

impl KnowledgeError {
    pub fn code(&self) -> &'static str {
        match self {
            KnowledgeError::Database(_) => "database_error",
            KnowledgeError::DocumentNotFound(_) => "document_not_found",
            KnowledgeError::WrongDimension { .. } => "invalid_embedding",
            KnowledgeError::RetrievalEmpty(_) => "retrieval_empty",
        }
    }
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;
