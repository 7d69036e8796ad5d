//! Cross-cutting error types for Kutplix.
//!
//! This module defines domain errors that can originate from any crate in the
//! system. Storage errors (`DatabaseError`) and HTTP errors (`ApiError`) are
//! defined in their respective crates and wrap `CoreError`.

use thiserror::Error;

use crate::policy::Denied;

/// Errors that can be raised by any Kutplix crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// The caller's role or company does not permit the operation.
    #[error("Forbidden: {0}")]
    Forbidden(#[from] Denied),

    /// The requested grid action is not one of the known actions.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// A state machine transition was attempted that is not allowed.
    #[error("Invalid state transition: {entity_type} {id} from {from} to {to}")]
    InvalidTransition {
        entity_type: String,
        id: String,
        from: String,
        to: String,
    },

    /// Data failed validation (format, ranges, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The write lost a race or collides with an existing row.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
