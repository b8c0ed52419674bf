//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, ValidationError};

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("layer sorting configuration invalid: {} problem(s)", .errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("{resource} not available: {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn unavailable(resource: impl Into<String>, reason: impl ToString) -> Self {
        ApplicationError::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
