use thiserror::Error;

/// C1/C3/C8 error taxonomy.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed webhook body: {0}")]
    MalformedBody(String),

    #[error("media fetch failed: {0}")]
    MediaFetchFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

impl LineError {
    pub fn code(&self) -> &'static str {
        match self {
            LineError::InvalidSignature => "invalid_signature",
            LineError::MalformedBody(_) => "malformed_body",
            LineError::MediaFetchFailed(_) => "media_fetch_failed",
            LineError::SendFailed(_) => "send_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, LineError>;
