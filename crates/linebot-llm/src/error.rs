use thiserror::Error;

/// C6 error taxonomy. `retryable()` drives the retry loop in [`crate::retry`];
/// `code()` maps onto the platform-wide taxonomy in the design doc
/// (`llm_unavailable` absorbs everything here at the orchestrator boundary).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("upstream server error ({status})")]
    ServerError { status: u16 },

    #[error("upstream rejected the request ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("could not parse provider response: {0}")]
    Parse(String),

    #[error("circuit breaker open, failing fast")]
    CircuitOpen,

    #[error("no provider configured for '{0}'")]
    UnknownProvider(String),
}

impl LlmError {
    pub fn code(&self) -> &'static str {
        "llm_unavailable"
    }

    /// Whether this failure belongs to the retryable set in §4.6:
    /// {rate-limited, connection error, timeout, 5xx}.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Transport(_)
                | LlmError::Timeout { .. }
                | LlmError::RateLimited { .. }
                | LlmError::ServerError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
