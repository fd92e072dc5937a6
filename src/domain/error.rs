use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Caller-facing description without the error prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message } => message,
        }
    }
}
