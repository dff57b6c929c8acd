//! Error types shared by every grocery domain module.

use std::fmt;
use thiserror::Error;

/// Result type alias for domain and storage operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Error taxonomy for the grocery service.
///
/// Per-item stock failures (missing product, insufficient headroom) are *not*
/// errors: they are reported as values inside batch outcomes. Only malformed
/// input, business-rule violations on single entities and storage faults are
/// surfaced here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input failed validation; no storage was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A single referenced entity does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Entity kind (e.g. "Product")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The entity exists but is not in a state that allows the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown email or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The caller may not act on this entity.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected storage failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl DomainError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Create a database error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Whether this error represents an infrastructure fault rather than a
    /// caller mistake.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = DomainError::not_found("Product", "abc");
        assert_eq!(err.to_string(), "Product with id abc not found");
    }

    #[test]
    fn only_database_errors_are_internal() {
        assert!(DomainError::database("boom").is_internal());
        assert!(!DomainError::validation("bad").is_internal());
        assert!(!DomainError::conflict("state").is_internal());
        assert!(!DomainError::InvalidCredentials.is_internal());
    }
}
