//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures of the entity model (validation,
/// invariants, undecodable payloads). Backend and transport failures belong to
/// the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. a negative salary bound).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. `salary.min > salary.max`).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (empty or blank).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A wire payload could not be decoded into an entity.
    #[error("undecodable payload: {0}")]
    Decode(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
