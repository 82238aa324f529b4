//! Error types for the core crate.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while resolving or validating domain metadata.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The named entity type is not part of the model.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// The entity type has no attribute or navigation with that name.
    #[error("unknown member '{member}' on entity '{entity}'")]
    UnknownMember {
        /// The owning entity type.
        entity: String,
        /// The member that failed to resolve.
        member: String,
    },

    /// The model is internally inconsistent.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A value or type did not have the expected shape.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The actual type.
        actual: String,
    },
}

impl CoreError {
    /// Creates an unknown member error.
    #[must_use]
    pub fn unknown_member(entity: impl Into<String>, member: impl Into<String>) -> Self {
        Self::UnknownMember { entity: entity.into(), member: member.into() }
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch { expected: expected.into(), actual: actual.into() }
    }
}
