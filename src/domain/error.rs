//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors raised while mutating a layer tree.
///
/// Configuration problems are never reported here; they are collected as
/// [`ValidationError`](crate::domain::ValidationError) entries before any
/// mutation starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("parent '{parent}' of layer '{id}' cannot be resolved to a group layer")]
    ParentResolutionFailure { id: String, parent: String },

    #[error("layer '{0}' is not a group layer")]
    NotAContainer(String),

    #[error("layer '{0}' is not part of the tree")]
    UnknownNode(String),

    #[error("moving '{id}' below '{parent}' would nest it inside itself")]
    WouldNest { id: String, parent: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
