use thiserror::Error;

/// Errors from the domain model
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid artifact payload: {0}")]
    InvalidPayload(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rule parse error: {0}")]
    RuleParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
