//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure: bad input, broken invariant, stale version.
///
/// Storage and transport failures are infrastructure errors and never end up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Caller input was rejected (e.g. a cart line with a non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A shipment-model invariant would be broken (e.g. an untagged line in a combination).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Version mismatch under optimistic concurrency.
    #[error("conflict: {0}")]
    Conflict(String),
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

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_their_context() {
        assert_eq!(
            DomainError::validation("quantity must be positive (sku A1)").to_string(),
            "validation failed: quantity must be positive (sku A1)"
        );
        assert_eq!(
            DomainError::invariant("origin listed twice").to_string(),
            "invariant violated: origin listed twice"
        );
    }
}
