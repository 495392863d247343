use thiserror::Error;

/// C7 error taxonomy. A template that fails to evaluate is skipped, not
/// fatal — see `LogicError::code` and the orchestrator's handling of it.
#[derive(Debug, Error)]
pub enum LogicError {
    #[error("logic template {template_id} invalid: {reason}")]
    TemplateInvalid { template_id: String, reason: String },
}

impl LogicError {
    pub fn code(&self) -> &'static str {
        "logic_template_invalid"
    }
}

pub type Result<T> = std::result::Result<T, LogicError>;
