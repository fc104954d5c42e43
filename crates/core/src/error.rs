//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error category, so an outer layer can map failures onto its own
/// transport (validation → 4xx, not found → 404, business rule → 409/422)
/// without the domain knowing about any transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed input, rejected before any mutation.
    Validation,
    /// The addressed record does not exist.
    NotFound,
    /// Input was valid, but a business rule blocks the operation.
    BusinessRule,
    /// A concurrent writer won; the caller may retry.
    Conflict,
    /// Storage or plumbing failure outside the domain's control.
    Infrastructure,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("{0} not found")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
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

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorCategory::Validation,
            DomainError::InvariantViolation(_) => ErrorCategory::BusinessRule,
            DomainError::NotFound(_) => ErrorCategory::NotFound,
            DomainError::Conflict(_) => ErrorCategory::Conflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_separate_absent_from_blocked() {
        assert_eq!(DomainError::not_found("lot").category(), ErrorCategory::NotFound);
        assert_eq!(
            DomainError::invariant("allocated exceeds quantity").category(),
            ErrorCategory::BusinessRule
        );
        assert_eq!(DomainError::validation("x").category(), ErrorCategory::Validation);
        assert_eq!(DomainError::invalid_id("x").category(), ErrorCategory::Validation);
        assert_eq!(DomainError::conflict("x").category(), ErrorCategory::Conflict);
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(DomainError::not_found("allocation").to_string(), "allocation not found");
    }
}
